//! Inheritable-attribute tree.
//!
//! Timing attributes (timescale, duration, start number, availability
//! offset) and the segment-addressing profiles (Base/List/Template plus an
//! optional Timeline) can be declared at any level of the manifest tree and
//! apply to everything below. Resolution follows the original lookup order:
//! the node itself, then the same declaration path replayed against each
//! ancestor level (deepest path first), then any plain ancestor.
//!
//! Nodes are arena-indexed: a node refers to its parent by [`NodeId`], never
//! by pointer, so a manifest refresh can swap payloads without dangling
//! references and the walk is trivially bounded by tree depth.

use crate::playlist::segment_base::SegmentBase;
use crate::playlist::segment_list::SegmentList;
use crate::playlist::template::SegmentTemplate;
use crate::playlist::timeline::SegmentTimeline;
use crate::time::{ScaledTime, Tick, Timescale};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// What kind of tree node this is. `SegmentInformation` nodes (playlist,
/// period, adaptation set, representation) are the canonical roots the
/// path-matching walk anchors on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    SegmentInformation,
    SegmentBase,
    SegmentList,
    SegmentTemplate,
    Timeline,
}

/// Attribute key, shared by scalar attributes and child profile nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Timescale,
    Duration,
    StartNumber,
    AvailabilityTimeOffset,
    AvailabilityTimeComplete,
    SegmentBase,
    SegmentList,
    SegmentTemplate,
    Timeline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Timescale(Timescale),
    Duration(ScaledTime),
    StartNumber(u64),
    AvailabilityTimeOffset(Tick),
    AvailabilityTimeComplete(bool),
    /// Child node carrying a profile payload (Base/List/Template/Timeline).
    Node(NodeId),
}

impl AttrValue {
    fn is_valid(&self) -> bool {
        match self {
            AttrValue::Timescale(ts) => ts.is_valid(),
            AttrValue::Duration(d) => *d > 0,
            _ => true,
        }
    }
}

/// Payload of a profile node.
#[derive(Debug, Default)]
pub enum Payload {
    #[default]
    None,
    Base(SegmentBase),
    List(SegmentList),
    Template(SegmentTemplate),
    Timeline(SegmentTimeline),
}

/// Template-substitution context carried by representation nodes.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub representation_id: Option<String>,
    pub bandwidth: Option<u64>,
}

#[derive(Debug)]
pub struct AttrsNode {
    parent: Option<NodeId>,
    node_type: NodeType,
    attrs: Vec<(AttrType, AttrValue)>,
    payload: Payload,
    context: Option<TemplateContext>,
}

impl AttrsNode {
    fn get(&self, ty: AttrType) -> Option<&AttrValue> {
        self.attrs.iter().find(|(t, _)| *t == ty).map(|(_, v)| v)
    }

    fn get_valid(&self, ty: AttrType) -> Option<&AttrValue> {
        self.get(ty).filter(|v| v.is_valid())
    }

    fn is_canonical_root(&self) -> bool {
        self.node_type == NodeType::SegmentInformation
    }
}

#[derive(Debug, Default)]
pub struct AttrsTree {
    nodes: Vec<AttrsNode>,
}

impl AttrsTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, parent: Option<NodeId>, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(AttrsNode {
            parent,
            node_type,
            attrs: Vec::new(),
            payload: Payload::None,
            context: None,
        });
        id
    }

    fn node(&self, id: NodeId) -> &AttrsNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut AttrsNode {
        &mut self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn node_type(&self, id: NodeId) -> NodeType {
        self.node(id).node_type
    }

    /// Set or replace an attribute on a node.
    pub fn set_attr(&mut self, id: NodeId, ty: AttrType, value: AttrValue) {
        let node = self.node_mut(id);
        if let Some(slot) = node.attrs.iter_mut().find(|(t, _)| *t == ty) {
            slot.1 = value;
        } else {
            node.attrs.push((ty, value));
        }
    }

    pub fn set_timescale(&mut self, id: NodeId, ts: Timescale) {
        self.set_attr(id, AttrType::Timescale, AttrValue::Timescale(ts));
    }

    pub fn set_duration(&mut self, id: NodeId, d: ScaledTime) {
        self.set_attr(id, AttrType::Duration, AttrValue::Duration(d));
    }

    pub fn set_start_number(&mut self, id: NodeId, n: u64) {
        self.set_attr(id, AttrType::StartNumber, AttrValue::StartNumber(n));
    }

    pub fn set_availability_time_offset(&mut self, id: NodeId, t: Tick) {
        self.set_attr(
            id,
            AttrType::AvailabilityTimeOffset,
            AttrValue::AvailabilityTimeOffset(t),
        );
    }

    pub fn set_context(&mut self, id: NodeId, context: TemplateContext) {
        self.node_mut(id).context = Some(context);
    }

    /// Attach a profile node (and payload) as an attribute of `owner`.
    pub fn attach_payload(&mut self, owner: NodeId, payload: Payload) -> NodeId {
        let (node_type, attr_type) = match &payload {
            Payload::Base(_) => (NodeType::SegmentBase, AttrType::SegmentBase),
            Payload::List(_) => (NodeType::SegmentList, AttrType::SegmentList),
            Payload::Template(_) => (NodeType::SegmentTemplate, AttrType::SegmentTemplate),
            Payload::Timeline(_) => (NodeType::Timeline, AttrType::Timeline),
            Payload::None => unreachable!("empty payload"),
        };
        let child = self.add_node(Some(owner), node_type);
        self.node_mut(child).payload = payload;
        self.set_attr(owner, attr_type, AttrValue::Node(child));
        child
    }

    pub fn payload(&self, id: NodeId) -> &Payload {
        &self.node(id).payload
    }

    pub fn payload_mut(&mut self, id: NodeId) -> &mut Payload {
        &mut self.node_mut(id).payload
    }

    /// Resolve an attribute starting at `from`, using the full inheritance
    /// walk. Returns the first valid match.
    pub fn inherit(&self, from: NodeId, ty: AttrType) -> Option<&AttrValue> {
        if let Some(v) = self.node(from).get_valid(ty) {
            return Some(v);
        }

        // Record the declaration path from `from` up to its canonical root.
        let mut matching_path: Vec<NodeType> = Vec::new();
        let mut root = None;
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let node = self.node(id);
            if node.is_canonical_root() {
                root = Some(id);
                break;
            }
            matching_path.insert(0, node.node_type);
            cursor = node.parent;
        }

        // Replay the path (deepest prefix first) against each ancestor level.
        if let Some(root) = root {
            let mut path = matching_path.as_slice();
            while !path.is_empty() {
                let mut cursor = self.node(root).parent;
                while let Some(id) = cursor {
                    if let Some(v) = self.get_by_path(id, path, ty) {
                        return Some(v);
                    }
                    cursor = self.node(id).parent;
                }
                path = &path[..path.len() - 1];
            }
        }

        // Plain ancestor fallback.
        let mut cursor = self.node(from).parent;
        while let Some(id) = cursor {
            if let Some(v) = self.node(id).get_valid(ty) {
                return Some(v);
            }
            cursor = self.node(id).parent;
        }
        None
    }

    /// Follow `path` through child profile nodes of `start`, then read `ty`
    /// on the node it lands on.
    fn get_by_path(&self, start: NodeId, path: &[NodeType], ty: AttrType) -> Option<&AttrValue> {
        let mut id = start;
        for step in path {
            let attr_type = match step {
                NodeType::SegmentBase => AttrType::SegmentBase,
                NodeType::SegmentList => AttrType::SegmentList,
                NodeType::SegmentTemplate => AttrType::SegmentTemplate,
                NodeType::Timeline => AttrType::Timeline,
                NodeType::SegmentInformation => return None,
            };
            match self.node(id).get_valid(attr_type) {
                Some(AttrValue::Node(child)) => id = *child,
                _ => return None,
            }
        }
        self.node(id).get_valid(ty)
    }

    pub fn inherit_timescale(&self, from: NodeId) -> Timescale {
        match self.inherit(from, AttrType::Timescale) {
            Some(AttrValue::Timescale(ts)) => *ts,
            _ => Timescale::new(1),
        }
    }

    pub fn inherit_duration(&self, from: NodeId) -> ScaledTime {
        match self.inherit(from, AttrType::Duration) {
            Some(AttrValue::Duration(d)) => *d,
            _ => 0,
        }
    }

    pub fn inherit_start_number(&self, from: NodeId) -> Option<u64> {
        match self.inherit(from, AttrType::StartNumber) {
            Some(AttrValue::StartNumber(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn inherit_availability_time_offset(&self, from: NodeId) -> Tick {
        match self.inherit(from, AttrType::AvailabilityTimeOffset) {
            Some(AttrValue::AvailabilityTimeOffset(t)) => *t,
            _ => 0,
        }
    }

    fn inherit_node(&self, from: NodeId, ty: AttrType) -> Option<NodeId> {
        match self.inherit(from, ty) {
            Some(AttrValue::Node(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn inherit_segment_base(&self, from: NodeId) -> Option<NodeId> {
        self.inherit_node(from, AttrType::SegmentBase)
    }

    pub fn inherit_segment_list(&self, from: NodeId) -> Option<NodeId> {
        self.inherit_node(from, AttrType::SegmentList)
    }

    pub fn inherit_segment_template(&self, from: NodeId) -> Option<NodeId> {
        self.inherit_node(from, AttrType::SegmentTemplate)
    }

    pub fn inherit_segment_timeline(&self, from: NodeId) -> Option<NodeId> {
        self.inherit_node(from, AttrType::Timeline)
    }

    pub fn timeline(&self, from: NodeId) -> Option<&SegmentTimeline> {
        let id = self.inherit_segment_timeline(from)?;
        match self.payload(id) {
            Payload::Timeline(tl) => Some(tl),
            _ => None,
        }
    }

    /// Nearest template context at or above `from`.
    pub fn template_context(&self, from: NodeId) -> Option<&TemplateContext> {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let node = self.node(id);
            if let Some(ctx) = &node.context {
                return Some(ctx);
            }
            cursor = node.parent;
        }
        None
    }
}
