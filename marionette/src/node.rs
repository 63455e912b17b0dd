use {
    ahash::AHashMap,
    nalgebra as na,
    smallvec::SmallVec,
    std::{fmt::Debug, hash::Hash},
};

/// Index of a node in its `JointTree`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("Joint tree declares no root node")]
    NoRoot,

    #[error("Joint tree declares more than one root: {first} and {second}")]
    MultipleRoots { first: String, second: String },

    #[error("Node {key} is declared twice")]
    DuplicateKey { key: String },

    #[error("Node {key} refers to undeclared parent {parent}")]
    UnknownParent { key: String, parent: String },

    #[error("Node {key} is not reachable from the root")]
    Detached { key: String },
}

/// One joint or bone of a skeleton tree.
///
/// Raw state is the latest absolute sample in the space of the owning
/// skeleton. Local state is relative to the parent and is valid only after
/// `JointTree::calculate_offsets`.
#[derive(Clone, Debug)]
pub struct JointNode<K> {
    key: K,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
    raw_position: na::Vector3<f32>,
    raw_rotation: na::UnitQuaternion<f32>,
    local_position: na::Vector3<f32>,
    local_rotation: na::UnitQuaternion<f32>,
}

impl<K> JointNode<K> {
    fn new(key: K, parent: Option<NodeId>) -> Self {
        JointNode {
            key,
            parent,
            children: SmallVec::new(),
            raw_position: na::Vector3::zeros(),
            raw_rotation: na::UnitQuaternion::identity(),
            local_position: na::Vector3::zeros(),
            local_rotation: na::UnitQuaternion::identity(),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn raw_position(&self) -> &na::Vector3<f32> {
        &self.raw_position
    }

    pub fn raw_rotation(&self) -> &na::UnitQuaternion<f32> {
        &self.raw_rotation
    }

    pub fn local_position(&self) -> &na::Vector3<f32> {
        &self.local_position
    }

    pub fn local_rotation(&self) -> &na::UnitQuaternion<f32> {
        &self.local_rotation
    }
}

/// Single-rooted tree of joints stored in an arena.
/// Children are owned through the arena, parent links are plain indices.
#[derive(Clone, Debug)]
pub struct JointTree<K> {
    nodes: Vec<JointNode<K>>,
    index: AHashMap<K, NodeId>,
}

impl<K> JointTree<K>
where
    K: Clone + Eq + Hash + Debug,
{
    pub fn new(root: K) -> Self {
        let mut index = AHashMap::new();
        index.insert(root.clone(), NodeId(0));

        JointTree {
            nodes: vec![JointNode::new(root, None)],
            index,
        }
    }

    /// Builds tree from `(key, parent)` declarations.
    /// Children keep declaration order.
    pub fn from_parents<I>(declarations: I) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = (K, Option<K>)>,
    {
        let declarations: Vec<(K, Option<K>)> =
            declarations.into_iter().collect();

        let mut declared = AHashMap::with_capacity(declarations.len());
        let mut root: Option<&K> = None;

        for (key, parent) in &declarations {
            if declared.insert(key, ()).is_some() {
                return Err(TreeError::DuplicateKey {
                    key: format!("{:?}", key),
                });
            }

            if parent.is_none() {
                if let Some(first) = root {
                    return Err(TreeError::MultipleRoots {
                        first: format!("{:?}", first),
                        second: format!("{:?}", key),
                    });
                }
                root = Some(key);
            }
        }

        let root = root.ok_or(TreeError::NoRoot)?;

        let mut children: AHashMap<&K, Vec<&K>> = AHashMap::new();
        for (key, parent) in &declarations {
            if let Some(parent) = parent {
                if !declared.contains_key(parent) {
                    return Err(TreeError::UnknownParent {
                        key: format!("{:?}", key),
                        parent: format!("{:?}", parent),
                    });
                }
                children.entry(parent).or_default().push(key);
            }
        }

        let mut tree = JointTree::new(root.clone());
        let mut stack = vec![(tree.root(), root)];

        while let Some((id, key)) = stack.pop() {
            if let Some(keys) = children.get(key) {
                for &child in keys {
                    let child_id = tree.add_child(id, child.clone())?;
                    stack.push((child_id, child));
                }
            }
        }

        // Cycles and chains that never reach the root stay unattached.
        if let Some((detached, _)) = declarations
            .iter()
            .find(|(key, _)| !tree.index.contains_key(key))
        {
            return Err(TreeError::Detached {
                key: format!("{:?}", detached),
            });
        }

        Ok(tree)
    }

    /// Appends new node as the last child of `parent`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        key: K,
    ) -> Result<NodeId, TreeError> {
        if self.index.contains_key(&key) {
            return Err(TreeError::DuplicateKey {
                key: format!("{:?}", key),
            });
        }

        let id = NodeId(self.nodes.len());
        self.index.insert(key.clone(), id);
        self.nodes.push(JointNode::new(key, Some(parent)));
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn get(&self, key: &K) -> Option<NodeId> {
        self.index.get(key).copied()
    }
}

impl<K> JointTree<K> {
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Ids of all nodes in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn node(&self, id: NodeId) -> &JointNode<K> {
        &self.nodes[id.0]
    }

    pub fn key(&self, id: NodeId) -> &K {
        &self.nodes[id.0].key
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn set_raw(
        &mut self,
        id: NodeId,
        position: na::Vector3<f32>,
        rotation: na::UnitQuaternion<f32>,
    ) {
        let node = &mut self.nodes[id.0];
        node.raw_position = position;
        node.raw_rotation = rotation;
    }

    /// Recomputes local state of every node from raw state.
    pub fn calculate_offsets(&mut self) {
        self.calculate_offsets_with(
            na::Vector3::zeros(),
            na::UnitQuaternion::identity(),
        )
    }

    /// Recomputes local state top-down, starting at the root with the given
    /// accumulated offset.
    ///
    /// Root's local position is `raw + offset`, any other node's is
    /// `raw - offset`. Local rotation is `offset^-1 * raw` for all nodes.
    /// Children of the root receive root's raw state as offset, deeper nodes
    /// receive parent's offset composed with parent's local state.
    pub fn calculate_offsets_with(
        &mut self,
        offset_position: na::Vector3<f32>,
        offset_rotation: na::UnitQuaternion<f32>,
    ) {
        let root = self.root();
        self.propagate(root, offset_position, offset_rotation);
    }

    fn propagate(
        &mut self,
        id: NodeId,
        offset_position: na::Vector3<f32>,
        offset_rotation: na::UnitQuaternion<f32>,
    ) {
        let node = &mut self.nodes[id.0];

        node.local_position = match node.parent {
            None => node.raw_position + offset_position,
            Some(_) => node.raw_position - offset_position,
        };
        node.local_rotation = offset_rotation.inverse() * node.raw_rotation;

        let (child_position, child_rotation) = match node.parent {
            None => (node.raw_position, node.raw_rotation),
            Some(_) => (
                offset_position + node.local_position,
                offset_rotation * node.local_rotation,
            ),
        };

        for index in 0..self.nodes[id.0].children.len() {
            let child = self.nodes[id.0].children[index];
            self.propagate(child, child_position, child_rotation);
        }
    }

    /// Sum of local positions from the root down to the node.
    pub fn position(&self, id: NodeId) -> na::Vector3<f32> {
        let mut node = &self.nodes[id.0];
        let mut position = node.local_position;
        while let Some(parent) = node.parent {
            node = &self.nodes[parent.0];
            position += node.local_position;
        }
        position
    }

    /// Product of local rotations from the root down to the node.
    /// Parent rotation is applied before child's local rotation.
    pub fn rotation(&self, id: NodeId) -> na::UnitQuaternion<f32> {
        let mut node = &self.nodes[id.0];
        let mut rotation = node.local_rotation;
        while let Some(parent) = node.parent {
            node = &self.nodes[parent.0];
            rotation = node.local_rotation * rotation;
        }
        rotation
    }

    /// Iterates nodes depth-first, parents before children,
    /// siblings in insertion order.
    pub fn depth_first(&self) -> DepthFirst<'_, K> {
        DepthFirst {
            tree: self,
            stack: vec![self.root()],
        }
    }
}

pub struct DepthFirst<'a, K> {
    tree: &'a JointTree<K>,
    stack: Vec<NodeId>,
}

impl<'a, K> Iterator for DepthFirst<'a, K> {
    type Item = (NodeId, &'a JointNode<K>);

    fn next(&mut self) -> Option<(NodeId, &'a JointNode<K>)> {
        let id = self.stack.pop()?;
        let node = &self.tree.nodes[id.0];
        self.stack.extend(node.children.iter().rev().copied());
        Some((id, node))
    }
}
