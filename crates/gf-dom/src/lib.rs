//! DOM tree data structures.

pub mod mutation;

use gf_core::EmbedError;
use gf_core::EmbedResult;
use mutation::Observer;

pub use mutation::MutationRecord;
pub use mutation::ObserverHandle;
pub use mutation::ObserverOptions;

/// ID used to address nodes in the DOM arena.
pub type NodeId = usize;

/// Element payload: lowercase tag, ordered attributes, and attached listener tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    listeners: Vec<String>,
    /// Set for elements produced by the markup parser; such scripts never run.
    inert: bool,
    started: bool,
}

impl Element {
    fn new(tag: &str, attrs: Vec<(String, String)>, inert: bool) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs,
            listeners: Vec::new(),
            inert,
            started: false,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_inert(&self) -> bool {
        self.inert
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    /// Detached container whose children move out on insertion (template content).
    Fragment,
    ShadowRoot { host: NodeId },
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
    shadow_root: Option<NodeId>,
}

/// Arena-backed document with mutation delivery queues.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    observers: Vec<Observer>,
    next_observer: u64,
    pending_scripts: Vec<NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
                shadow_root: None,
            }],
            observers: Vec::new(),
            next_observer: 1,
            pending_scripts: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id).map(|node| &node.kind)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.kind(id) {
            Some(NodeKind::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeKind::Element(Element::new(tag, Vec::new(), false)))
    }

    /// Creates an element the way the markup parser does: scripts made here stay inert.
    pub fn create_parsed_element(&mut self, tag: &str, attrs: Vec<(String, String)>) -> NodeId {
        self.push_node(NodeKind::Element(Element::new(tag, attrs, true)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeKind::Text(text.to_owned()))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.push_node(NodeKind::Fragment)
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            kind,
            shadow_root: None,
        });
        self.nodes.len() - 1
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> EmbedResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Inserts `child` before `reference` (or last). Fragments contribute their children.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> EmbedResult<()> {
        self.ensure_node(parent)?;
        self.ensure_node(child)?;
        self.ensure_container(parent)?;

        let moving = if matches!(self.nodes[child].kind, NodeKind::Fragment) {
            std::mem::take(&mut self.nodes[child].children)
        } else {
            if matches!(self.nodes[child].kind, NodeKind::Document | NodeKind::ShadowRoot { .. }) {
                return Err(EmbedError::new(
                    "dom.hierarchy.invalid_child",
                    format!("node {child} cannot be inserted as a child"),
                ));
            }
            if self.is_inclusive_ancestor(child, parent) {
                return Err(EmbedError::new(
                    "dom.hierarchy.cycle",
                    format!("node {child} is an ancestor of {parent}"),
                ));
            }
            self.detach(child);
            vec![child]
        };

        if moving.is_empty() {
            return Ok(());
        }

        let position = match reference {
            Some(reference) => self.nodes[parent]
                .children
                .iter()
                .position(|candidate| *candidate == reference)
                .ok_or_else(|| {
                    EmbedError::new(
                        "dom.node.not_child",
                        format!("reference node {reference} is not a child of {parent}"),
                    )
                })?,
            None => self.nodes[parent].children.len(),
        };

        for (offset, node) in moving.iter().enumerate() {
            self.nodes[*node].parent = Some(parent);
            self.nodes[parent].children.insert(position + offset, *node);
        }

        self.queue_record(MutationRecord::ChildList {
            target: parent,
            added: moving.clone(),
            removed: Vec::new(),
        });
        for node in moving {
            self.queue_scripts_in(node);
        }

        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> EmbedResult<()> {
        self.ensure_node(parent)?;
        if self.parent(child) != Some(parent) {
            return Err(EmbedError::new(
                "dom.node.not_child",
                format!("node {child} is not a child of {parent}"),
            ));
        }

        self.detach(child);
        Ok(())
    }

    /// Swaps `old` for `new` in place, producing a single child-list record.
    pub fn replace_child(&mut self, parent: NodeId, new: NodeId, old: NodeId) -> EmbedResult<()> {
        self.ensure_node(parent)?;
        self.ensure_node(new)?;
        if self.parent(old) != Some(parent) {
            return Err(EmbedError::new(
                "dom.node.not_child",
                format!("node {old} is not a child of {parent}"),
            ));
        }
        if !matches!(self.nodes[new].kind, NodeKind::Element(_) | NodeKind::Text(_)) {
            return Err(EmbedError::new(
                "dom.hierarchy.invalid_child",
                format!("node {new} cannot replace a child"),
            ));
        }
        if self.is_inclusive_ancestor(new, parent) {
            return Err(EmbedError::new(
                "dom.hierarchy.cycle",
                format!("node {new} is an ancestor of {parent}"),
            ));
        }

        self.detach(new);
        let Some(position) = self.nodes[parent]
            .children
            .iter()
            .position(|candidate| *candidate == old)
        else {
            return Err(EmbedError::new(
                "dom.node.not_child",
                format!("node {old} is not a child of {parent}"),
            ));
        };

        self.nodes[parent].children[position] = new;
        self.nodes[new].parent = Some(parent);
        self.nodes[old].parent = None;

        self.queue_record(MutationRecord::ChildList {
            target: parent,
            added: vec![new],
            removed: vec![old],
        });
        self.queue_scripts_in(new);
        Ok(())
    }

    /// Removes every child of `parent`, then inserts `replacement` (fragment or node).
    pub fn replace_children(&mut self, parent: NodeId, replacement: NodeId) -> EmbedResult<()> {
        self.ensure_container(parent)?;
        let removed = std::mem::take(&mut self.nodes[parent].children);
        for node in &removed {
            self.nodes[*node].parent = None;
        }
        if !removed.is_empty() {
            self.queue_record(MutationRecord::ChildList {
                target: parent,
                added: Vec::new(),
                removed,
            });
        }

        self.append_child(parent, replacement)
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|element| element.attr(name))
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> EmbedResult<()> {
        let element = self.element_mut(id)?;
        let name = name.to_ascii_lowercase();
        let old_value = match element.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value.to_owned())),
            None => {
                element.attrs.push((name.clone(), value.to_owned()));
                None
            }
        };

        self.queue_record(MutationRecord::Attributes {
            target: id,
            name,
            old_value,
        });
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> EmbedResult<()> {
        let element = self.element_mut(id)?;
        let Some(position) = element
            .attrs
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
        else {
            return Ok(());
        };

        let (name, old_value) = element.attrs.remove(position);
        self.queue_record(MutationRecord::Attributes {
            target: id,
            name,
            old_value: Some(old_value),
        });
        Ok(())
    }

    /// Attaches a named listener once; returns `false` when it was already present.
    pub fn add_listener(&mut self, id: NodeId, tag: &str) -> EmbedResult<bool> {
        let element = self.element_mut(id)?;
        if element.listeners.iter().any(|existing| existing == tag) {
            return Ok(false);
        }

        element.listeners.push(tag.to_owned());
        Ok(true)
    }

    pub fn has_listener(&self, id: NodeId, tag: &str) -> bool {
        self.element(id)
            .is_some_and(|element| element.listeners.iter().any(|existing| existing == tag))
    }

    pub fn attach_shadow(&mut self, host: NodeId) -> EmbedResult<NodeId> {
        self.element_mut(host)?;
        if let Some(existing) = self.nodes[host].shadow_root {
            return Err(EmbedError::new(
                "dom.shadow.already_attached",
                format!("node {host} already hosts shadow root {existing}"),
            ));
        }

        let shadow = self.push_node(NodeKind::ShadowRoot { host });
        self.nodes[host].shadow_root = Some(shadow);
        Ok(shadow)
    }

    pub fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
        self.nodes.get(host).and_then(|node| node.shadow_root)
    }

    /// Parent in the composed tree: shadow roots lead to their host.
    pub fn composed_parent(&self, id: NodeId) -> Option<NodeId> {
        match self.kind(id)? {
            NodeKind::ShadowRoot { host } => Some(*host),
            _ => self.parent(id),
        }
    }

    pub fn tree_root(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            let root = self.tree_root(current);
            match self.kind(root) {
                Some(NodeKind::Document) => return true,
                Some(NodeKind::ShadowRoot { host }) => current = *host,
                _ => return false,
            }
        }
    }

    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Preorder descendants of `root` (excluding it), not crossing shadow boundaries.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn elements_by_tag(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| {
                self.tag_name(*id)
                    .is_some_and(|name| name.eq_ignore_ascii_case(tag))
            })
            .collect()
    }

    pub fn element_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|id| self.attribute(*id, "id") == Some(value))
    }

    /// Nearest inclusive ancestor with the given tag.
    pub fn closest(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self
                .tag_name(node)
                .is_some_and(|name| name.eq_ignore_ascii_case(tag))
            {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(NodeKind::Text(text)) = self.kind(id) {
            return text.clone();
        }

        self.descendants(id)
            .into_iter()
            .filter_map(|node| match self.kind(node) {
                Some(NodeKind::Text(text)) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> EmbedResult<()> {
        let replacement = self.create_fragment();
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(replacement, text_node)?;
        }
        self.replace_children(id, replacement)
    }

    pub fn observe(&mut self, root: NodeId, options: ObserverOptions) -> EmbedResult<ObserverHandle> {
        self.ensure_node(root)?;
        let handle = ObserverHandle(self.next_observer);
        self.next_observer = self.next_observer.saturating_add(1);
        self.observers.push(Observer {
            handle,
            root,
            options,
            queue: Vec::new(),
        });
        Ok(handle)
    }

    /// Stops delivery and drops queued records; returns `false` for unknown handles.
    pub fn disconnect(&mut self, handle: ObserverHandle) -> bool {
        let before = self.observers.len();
        self.observers.retain(|observer| observer.handle != handle);
        self.observers.len() != before
    }

    pub fn take_records(&mut self, handle: ObserverHandle) -> Vec<MutationRecord> {
        self.observers
            .iter_mut()
            .find(|observer| observer.handle == handle)
            .map(|observer| std::mem::take(&mut observer.queue))
            .unwrap_or_default()
    }

    pub fn has_pending_records(&self) -> bool {
        self.observers
            .iter()
            .any(|observer| !observer.queue.is_empty())
    }

    /// Scripts that became connected without being parser-created, in insertion order.
    pub fn take_pending_scripts(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.pending_scripts)
    }

    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.nodes[child].parent.take() else {
            return;
        };

        self.nodes[parent].children.retain(|candidate| *candidate != child);
        self.queue_record(MutationRecord::ChildList {
            target: parent,
            added: Vec::new(),
            removed: vec![child],
        });
    }

    fn queue_record(&mut self, record: MutationRecord) {
        let target = record.target();
        let interested: Vec<usize> = self
            .observers
            .iter()
            .enumerate()
            .filter(|(_, observer)| {
                let in_scope = observer.root == target
                    || (observer.options.subtree
                        && self.is_inclusive_ancestor(observer.root, target));
                in_scope
                    && match &record {
                        MutationRecord::ChildList { .. } => observer.options.child_list,
                        MutationRecord::Attributes { name, .. } => {
                            observer.options.wants_attribute(name)
                        }
                    }
            })
            .map(|(index, _)| index)
            .collect();

        for index in interested {
            self.observers[index].queue.push(record.clone());
        }
    }

    fn queue_scripts_in(&mut self, node: NodeId) {
        if !self.is_connected(node) {
            return;
        }

        let mut candidates = vec![node];
        candidates.extend(self.descendants(node));
        for id in candidates {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            if let NodeKind::Element(element) = &mut node.kind
                && element.tag == "script"
                && !element.inert
                && !element.started
            {
                element.started = true;
                self.pending_scripts.push(id);
            }
        }
    }

    fn element_mut(&mut self, id: NodeId) -> EmbedResult<&mut Element> {
        match self.nodes.get_mut(id).map(|node| &mut node.kind) {
            Some(NodeKind::Element(element)) => Ok(element),
            Some(_) => Err(EmbedError::new(
                "dom.node.not_element",
                format!("node {id} is not an element"),
            )),
            None => Err(EmbedError::new(
                "dom.node.missing",
                format!("node {id} does not exist"),
            )),
        }
    }

    fn ensure_node(&self, id: NodeId) -> EmbedResult<()> {
        if id < self.nodes.len() {
            Ok(())
        } else {
            Err(EmbedError::new(
                "dom.node.missing",
                format!("node {id} does not exist"),
            ))
        }
    }

    fn ensure_container(&self, id: NodeId) -> EmbedResult<()> {
        self.ensure_node(id)?;
        match self.nodes[id].kind {
            NodeKind::Text(_) => Err(EmbedError::new(
                "dom.hierarchy.text_parent",
                format!("text node {id} cannot have children"),
            )),
            _ => Ok(()),
        }
    }
}
