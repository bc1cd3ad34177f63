//! Live Document Model
//!
//! In-process model of the document the engine annotates: an element tree with
//! attributes, a focus slot, subtree mutation observers and bubbling event
//! dispatch. Hosts drive it through [`Document`]; the engine only ever reads and
//! writes attributes, observes insertions and listens for clicks and keys.
//!
//! Element handles hold a weak pointer to their document. Writes through a handle
//! whose document has been dropped are silent no-ops, and elements removed from
//! the tree stay addressable (detached) so late writes against them are harmless.

use crate::error::DocumentError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// Tag name of image elements
pub const IMAGE_TAG: &str = "img";

/// Node identity within one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Handle returned by [`Document::observe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Handle returned by [`Document::add_event_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Event kinds the document dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Click,
    KeyDown,
}

/// A dispatched input event
#[derive(Debug, Clone)]
pub enum DomEvent {
    /// Pointer click at client coordinates
    Click { target: Element, x: f64, y: f64 },
    /// Key press delivered to the focused element
    KeyDown { target: Element, key: String },
}

impl DomEvent {
    pub fn target(&self) -> &Element {
        match self {
            DomEvent::Click { target, .. } | DomEvent::KeyDown { target, .. } => target,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            DomEvent::Click { .. } => EventType::Click,
            DomEvent::KeyDown { .. } => EventType::KeyDown,
        }
    }
}

/// Event listener callback
pub type Listener = Arc<dyn Fn(&DomEvent) + Send + Sync>;

/// Mutation observation options
#[derive(Debug, Clone, Copy, Default)]
pub struct ObserveOptions {
    /// Also report mutations anywhere below the observed node
    pub subtree: bool,
}

/// One structural change under an observed node
#[derive(Debug, Clone)]
pub struct MutationRecord {
    /// Parent whose child list changed
    pub target: Element,
    pub added: Vec<Element>,
    pub removed: Vec<Element>,
}

struct NodeData {
    tag: Arc<str>,
    attributes: BTreeMap<String, String>,
    value: String,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl NodeData {
    fn new(tag: Arc<str>) -> Self {
        Self {
            tag,
            attributes: BTreeMap::new(),
            value: String::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

struct ObserverEntry {
    target: NodeId,
    options: ObserveOptions,
    sender: mpsc::UnboundedSender<MutationRecord>,
}

struct ListenerEntry {
    id: ListenerId,
    target: NodeId,
    event_type: EventType,
    callback: Listener,
}

struct DocumentState {
    nodes: HashMap<NodeId, NodeData>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    focused: Option<NodeId>,
    observers: HashMap<ObserverId, ObserverEntry>,
    listeners: Vec<ListenerEntry>,
    next_id: u64,
}

impl DocumentState {
    fn allocate(&mut self, tag: Arc<str>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, NodeData::new(tag));
        id
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn contains(&self, id: NodeId) -> Result<(), DocumentError> {
        if self.nodes.contains_key(&id) {
            Ok(())
        } else {
            Err(DocumentError::NodeNotFound(id))
        }
    }

    /// True when `ancestor` is `node` or one of its ancestors
    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get_mut(&child)?.parent.take()?;
        if let Some(data) = self.nodes.get_mut(&parent) {
            data.children.retain(|c| *c != child);
        }
        Some(parent)
    }

    /// Pre-order walk below `id`, in document order
    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let mut stack: Vec<NodeId> = Vec::new();
        if let Some(data) = self.nodes.get(&id) {
            stack.extend(data.children.iter().rev());
        }
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(data) = self.nodes.get(&next) {
                stack.extend(data.children.iter().rev());
            }
        }
    }

    fn notify(&self, parent: NodeId, added: &[NodeId], removed: &[NodeId], doc: &Weak<Shared>) {
        if self.observers.is_empty() {
            return;
        }
        let handle = |id: &NodeId| self.element(*id, doc);
        for observer in self.observers.values() {
            let in_scope = observer.target == parent
                || (observer.options.subtree && self.is_inclusive_ancestor(observer.target, parent));
            if !in_scope {
                continue;
            }
            let (Some(target), Some(added), Some(removed)) = (
                handle(&parent),
                added.iter().map(handle).collect::<Option<Vec<_>>>(),
                removed.iter().map(handle).collect::<Option<Vec<_>>>(),
            ) else {
                continue;
            };
            // A closed receiver only means the observer is shutting down
            let _ = observer.sender.send(MutationRecord {
                target,
                added,
                removed,
            });
        }
    }

    fn element(&self, id: NodeId, doc: &Weak<Shared>) -> Option<Element> {
        self.nodes.get(&id).map(|data| Element {
            id,
            tag: Arc::clone(&data.tag),
            doc: doc.clone(),
        })
    }
}

struct Shared {
    state: RwLock<DocumentState>,
}

/// Shared handle to a live document
#[derive(Clone)]
pub struct Document {
    shared: Arc<Shared>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("Document")
            .field("nodes", &state.nodes.len())
            .field("observers", &state.observers.len())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl Document {
    /// Create an empty document with `html`, `head` and `body` elements
    pub fn new() -> Self {
        let mut state = DocumentState {
            nodes: HashMap::new(),
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            focused: None,
            observers: HashMap::new(),
            listeners: Vec::new(),
            next_id: 0,
        };
        let root = state.allocate(Arc::from("html"));
        let head = state.allocate(Arc::from("head"));
        let body = state.allocate(Arc::from("body"));
        for child in [head, body] {
            if let Some(data) = state.nodes.get_mut(&child) {
                data.parent = Some(root);
            }
            if let Some(data) = state.nodes.get_mut(&root) {
                data.children.push(child);
            }
        }
        state.root = root;
        state.head = head;
        state.body = body;

        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(state),
            }),
        }
    }

    fn weak(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    fn handle(&self, id: NodeId) -> Element {
        let state = self.shared.state.read();
        let tag = state
            .nodes
            .get(&id)
            .map(|d| Arc::clone(&d.tag))
            .unwrap_or_else(|| Arc::from(""));
        Element {
            id,
            tag,
            doc: self.weak(),
        }
    }

    /// Resolve an element handle to a node of this document
    fn own(&self, element: &Element) -> Result<NodeId, DocumentError> {
        if !Weak::ptr_eq(&element.doc, &self.weak()) {
            return Err(DocumentError::NodeNotFound(element.id));
        }
        self.shared.state.read().contains(element.id)?;
        Ok(element.id)
    }

    pub fn root(&self) -> Element {
        let id = self.shared.state.read().root;
        self.handle(id)
    }

    pub fn head(&self) -> Element {
        let id = self.shared.state.read().head;
        self.handle(id)
    }

    pub fn body(&self) -> Element {
        let id = self.shared.state.read().body;
        self.handle(id)
    }

    /// Create a detached element
    pub fn create_element(&self, tag: &str) -> Element {
        let tag: Arc<str> = Arc::from(tag.to_ascii_lowercase());
        let id = self.shared.state.write().allocate(Arc::clone(&tag));
        Element {
            id,
            tag,
            doc: self.weak(),
        }
    }

    /// Append `child` to `parent`, moving it if it is already attached elsewhere
    pub fn append_child(&self, parent: &Element, child: &Element) -> Result<(), DocumentError> {
        let parent_id = self.own(parent)?;
        let child_id = self.own(child)?;
        let weak = self.weak();
        let mut state = self.shared.state.write();

        if state.is_inclusive_ancestor(child_id, parent_id) {
            return Err(DocumentError::HierarchyRequest {
                parent: parent_id,
                child: child_id,
            });
        }

        if let Some(previous) = state.detach(child_id) {
            state.notify(previous, &[], &[child_id], &weak);
        }
        if let Some(data) = state.nodes.get_mut(&child_id) {
            data.parent = Some(parent_id);
        }
        if let Some(data) = state.nodes.get_mut(&parent_id) {
            data.children.push(child_id);
        }
        state.notify(parent_id, &[child_id], &[], &weak);
        Ok(())
    }

    /// Remove `child` from `parent`; the child stays addressable while detached
    pub fn remove_child(&self, parent: &Element, child: &Element) -> Result<(), DocumentError> {
        let parent_id = self.own(parent)?;
        let child_id = self.own(child)?;
        let weak = self.weak();
        let mut state = self.shared.state.write();

        let is_child = state
            .nodes
            .get(&child_id)
            .map(|data| data.parent == Some(parent_id))
            .unwrap_or(false);
        if !is_child {
            return Err(DocumentError::NotAChild {
                parent: parent_id,
                child: child_id,
            });
        }

        state.detach(child_id);
        if let Some(focused) = state.focused {
            if state.is_inclusive_ancestor(child_id, focused) {
                state.focused = None;
            }
        }
        state.notify(parent_id, &[], &[child_id], &weak);
        Ok(())
    }

    pub fn parent(&self, element: &Element) -> Option<Element> {
        let state = self.shared.state.read();
        let parent = state.nodes.get(&element.id)?.parent?;
        state.element(parent, &self.weak())
    }

    pub fn children(&self, element: &Element) -> Vec<Element> {
        let state = self.shared.state.read();
        let weak = self.weak();
        state
            .nodes
            .get(&element.id)
            .map(|data| {
                data.children
                    .iter()
                    .filter_map(|c| state.element(*c, &weak))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All elements below `element` in document order
    pub fn descendants(&self, element: &Element) -> Vec<Element> {
        let state = self.shared.state.read();
        let weak = self.weak();
        let mut ids = Vec::new();
        state.collect_descendants(element.id, &mut ids);
        ids.into_iter()
            .filter_map(|id| state.element(id, &weak))
            .collect()
    }

    /// Snapshot of every connected image element, in document order
    pub fn images(&self) -> Vec<Element> {
        self.descendants(&self.root())
            .into_iter()
            .filter(Element::is_image)
            .collect()
    }

    /// Whether the element is attached below the document root
    pub fn is_connected(&self, element: &Element) -> bool {
        if self.own(element).is_err() {
            return false;
        }
        let state = self.shared.state.read();
        state.is_inclusive_ancestor(state.root, element.id)
    }

    pub fn focus(&self, element: &Element) {
        if let Ok(id) = self.own(element) {
            self.shared.state.write().focused = Some(id);
        }
    }

    pub fn blur(&self) {
        self.shared.state.write().focused = None;
    }

    pub fn focused_element(&self) -> Option<Element> {
        let state = self.shared.state.read();
        let id = state.focused?;
        state.element(id, &self.weak())
    }

    /// Start observing child-list mutations at `target`
    pub fn observe(
        &self,
        target: &Element,
        options: ObserveOptions,
    ) -> Result<(ObserverId, mpsc::UnboundedReceiver<MutationRecord>), DocumentError> {
        let target = self.own(target)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.shared.state.write();
        let id = ObserverId(state.next_handle());
        state.observers.insert(
            id,
            ObserverEntry {
                target,
                options,
                sender,
            },
        );
        Ok((id, receiver))
    }

    /// Stop an observer; records not yet received are discarded with the channel
    pub fn disconnect(&self, observer: ObserverId) -> bool {
        self.shared.state.write().observers.remove(&observer).is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.shared.state.read().observers.len()
    }

    pub fn add_event_listener(
        &self,
        target: &Element,
        event_type: EventType,
        callback: Listener,
    ) -> Result<ListenerId, DocumentError> {
        let target = self.own(target)?;
        let mut state = self.shared.state.write();
        let id = ListenerId(state.next_handle());
        state.listeners.push(ListenerEntry {
            id,
            target,
            event_type,
            callback,
        });
        Ok(id)
    }

    pub fn remove_event_listener(&self, listener: ListenerId) -> bool {
        let mut state = self.shared.state.write();
        let before = state.listeners.len();
        state.listeners.retain(|l| l.id != listener);
        state.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.shared.state.read().listeners.len()
    }

    /// Dispatch an event from its target up through every ancestor.
    ///
    /// Listeners added while the event is in flight do not see it; listeners
    /// removed while it is in flight are skipped.
    pub fn dispatch(&self, event: DomEvent) {
        let event_type = event.event_type();
        let scheduled: Vec<(ListenerId, Listener)> = {
            let state = self.shared.state.read();
            let mut path = Vec::new();
            let mut current = Some(event.target().id);
            while let Some(id) = current {
                path.push(id);
                current = state.nodes.get(&id).and_then(|n| n.parent);
            }
            path.iter()
                .flat_map(|node| {
                    state
                        .listeners
                        .iter()
                        .filter(move |l| l.target == *node && l.event_type == event_type)
                        .map(|l| (l.id, Arc::clone(&l.callback)))
                })
                .collect()
        };

        for (id, callback) in scheduled {
            let still_registered = self.shared.state.read().listeners.iter().any(|l| l.id == id);
            if still_registered {
                callback(&event);
            }
        }
    }

    pub fn click(&self, target: &Element, x: f64, y: f64) {
        self.dispatch(DomEvent::Click {
            target: target.clone(),
            x,
            y,
        });
    }

    pub fn key_down(&self, target: &Element, key: &str) {
        self.dispatch(DomEvent::KeyDown {
            target: target.clone(),
            key: key.to_string(),
        });
    }

    fn with_node<R>(&self, element: &Element, f: impl FnOnce(&NodeData) -> R) -> Option<R> {
        self.own(element).ok()?;
        self.shared.state.read().nodes.get(&element.id).map(f)
    }

    fn with_node_mut<R>(&self, element: &Element, f: impl FnOnce(&mut NodeData) -> R) -> Option<R> {
        self.own(element).ok()?;
        self.shared.state.write().nodes.get_mut(&element.id).map(f)
    }

    /// Build a document from a serialized snapshot
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Result<Self, DocumentError> {
        let document = Self::new();
        let head = document.head();
        for node in &snapshot.head {
            document.build_node(&head, node)?;
        }
        let body = document.body();
        for node in &snapshot.body {
            document.build_node(&body, node)?;
        }
        Ok(document)
    }

    fn build_node(&self, parent: &Element, node: &NodeSnapshot) -> Result<(), DocumentError> {
        let element = self.create_element(&node.tag);
        for (name, value) in &node.attributes {
            element.set_attribute(name, value);
        }
        if !node.text.is_empty() {
            element.set_text(&node.text);
        }
        self.append_child(parent, &element)?;
        for child in &node.children {
            self.build_node(&element, child)?;
        }
        Ok(())
    }

    /// Serialize the connected `head` and `body` subtrees
    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            head: self
                .children(&self.head())
                .iter()
                .map(|c| self.snapshot_node(c))
                .collect(),
            body: self
                .children(&self.body())
                .iter()
                .map(|c| self.snapshot_node(c))
                .collect(),
        }
    }

    fn snapshot_node(&self, element: &Element) -> NodeSnapshot {
        let (attributes, text) = self
            .with_node(element, |data| (data.attributes.clone(), data.text.clone()))
            .unwrap_or_default();
        NodeSnapshot {
            tag: element.tag_name().to_string(),
            attributes,
            text,
            children: self
                .children(element)
                .iter()
                .map(|c| self.snapshot_node(c))
                .collect(),
        }
    }
}

/// Handle to one element of a [`Document`]
#[derive(Clone)]
pub struct Element {
    id: NodeId,
    tag: Arc<str>,
    doc: Weak<Shared>,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} #{}>", self.tag, self.id.0)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Weak::ptr_eq(&self.doc, &other.doc)
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Element {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Lowercase tag name
    pub fn tag_name(&self) -> &str {
        &self.tag
    }

    pub fn is_image(&self) -> bool {
        &*self.tag == IMAGE_TAG
    }

    /// Owning document, if it is still alive
    pub fn document(&self) -> Option<Document> {
        self.doc.upgrade().map(|shared| Document { shared })
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.document()?
            .with_node(self, |data| data.attributes.get(&name.to_ascii_lowercase()).cloned())
            .flatten()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.document()
            .and_then(|doc| doc.with_node(self, |data| data.attributes.contains_key(&name.to_ascii_lowercase())))
            .unwrap_or(false)
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        if let Some(doc) = self.document() {
            doc.with_node_mut(self, |data| {
                data.attributes
                    .insert(name.to_ascii_lowercase(), value.to_string())
            });
        }
    }

    pub fn remove_attribute(&self, name: &str) {
        if let Some(doc) = self.document() {
            doc.with_node_mut(self, |data| data.attributes.remove(&name.to_ascii_lowercase()));
        }
    }

    /// Current value of an input surface
    pub fn value(&self) -> String {
        self.document()
            .and_then(|doc| doc.with_node(self, |data| data.value.clone()))
            .unwrap_or_default()
    }

    pub fn set_value(&self, value: &str) {
        if let Some(doc) = self.document() {
            doc.with_node_mut(self, |data| data.value = value.to_string());
        }
    }

    pub fn text(&self) -> String {
        self.document()
            .and_then(|doc| doc.with_node(self, |data| data.text.clone()))
            .unwrap_or_default()
    }

    pub fn set_text(&self, text: &str) {
        if let Some(doc) = self.document() {
            doc.with_node_mut(self, |data| data.text = text.to_string());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.document()
            .map(|doc| doc.is_connected(self))
            .unwrap_or(false)
    }

    /// Detach from the current parent; no-op when already detached
    pub fn remove(&self) {
        if let Some(doc) = self.document() {
            if let Some(parent) = doc.parent(self) {
                let _ = doc.remove_child(&parent, self);
            }
        }
    }
}

/// Serialized element subtree
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_child(mut self, child: NodeSnapshot) -> Self {
        self.children.push(child);
        self
    }
}

/// Serialized document: the children of `head` and of `body`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub head: Vec<NodeSnapshot>,
    #[serde(default)]
    pub body: Vec<NodeSnapshot>,
}
