use {
    crate::rig::Rig,
    ahash::{AHashMap, AHashSet},
    hecs::{Entity, World},
    nalgebra as na,
    smallvec::SmallVec,
    std::sync::Arc,
};

/// Transform relative to the parent entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Local3 {
    pub parent: Entity,
    pub iso: na::Isometry3<f32>,
}

impl Local3 {
    pub fn from_iso(parent: Entity, iso: na::Isometry3<f32>) -> Self {
        Local3 { parent, iso }
    }
}

/// World space transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Global3 {
    pub iso: na::Isometry3<f32>,
}

impl Global3 {
    pub fn identity() -> Self {
        Global3 {
            iso: na::Isometry3::identity(),
        }
    }

    pub fn from_iso(iso: na::Isometry3<f32>) -> Self {
        Global3 { iso }
    }

    pub fn append_local(&self, local: &Local3) -> Self {
        Global3 {
            iso: self.iso * local.iso,
        }
    }
}

/// Marks entity as a named bone.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BoneName(pub Arc<str>);

/// Spawns bone without parent. Its `Global3` is authoritative.
pub fn spawn_root_bone(
    world: &mut World,
    name: &str,
    iso: na::Isometry3<f32>,
) -> Entity {
    world.spawn((BoneName(Arc::from(name)), Global3::from_iso(iso)))
}

/// Spawns bone attached to `parent`.
/// `Global3` is stale until `update_globals` runs.
pub fn spawn_bone(
    world: &mut World,
    name: &str,
    parent: Entity,
    iso: na::Isometry3<f32>,
) -> Entity {
    world.spawn((
        BoneName(Arc::from(name)),
        Local3::from_iso(parent, iso),
        Global3::identity(),
    ))
}

/// Recomputes `Global3` of every entity with `Local3` from its parent.
/// Entities whose parent is gone are despawned.
pub fn update_globals(world: &mut World) {
    let mut updated = AHashSet::new();
    let mut despawn = Vec::new();

    let entities: Vec<Entity> = world
        .query::<&Local3>()
        .with::<Global3>()
        .iter()
        .map(|(entity, _)| entity)
        .collect();

    for entity in entities {
        update_global(entity, world, &mut updated, &mut despawn);
    }

    // Despawn entities whose parents are despawned.
    for entity in despawn {
        let _ = world.despawn(entity);
    }
}

fn update_global(
    entity: Entity,
    world: &World,
    updated: &mut AHashSet<Entity>,
    despawn: &mut Vec<Entity>,
) -> Option<Global3> {
    if updated.contains(&entity) {
        return world.get::<Global3>(entity).ok().map(|global| *global);
    }

    let local = match world.get::<Local3>(entity) {
        Ok(local) => *local,
        Err(_) => return None,
    };

    let parent_has_parent = world.get::<Local3>(local.parent).is_ok();

    let parent_global = if parent_has_parent {
        update_global(local.parent, world, updated, despawn)
    } else {
        // Parent has no parent node.
        match world.get::<Global3>(local.parent) {
            // Parent is root node.
            Ok(global) => Some(*global),
            Err(_) => {
                tracing::warn!(
                    "Entity's ({:?}) parent is not in scene and shall be despawned",
                    entity
                );
                None
            }
        }
    };

    match parent_global {
        Some(parent_global) => {
            let global = parent_global.append_local(&local);
            if let Ok(mut global_ref) = world.get_mut::<Global3>(entity) {
                *global_ref = global;
            }
            updated.insert(entity);
            Some(global)
        }
        None => {
            despawn.push(entity);
            None
        }
    }
}

/// Bone hierarchy living in a `hecs` world.
///
/// Bones are entities with `BoneName` and `Global3`.
/// Every bone but the root also has `Local3`.
pub struct SceneRig {
    world: World,
    root: Option<Entity>,
    bones: Vec<Entity>,
    children: AHashMap<Entity, SmallVec<[Entity; 4]>>,
}

impl SceneRig {
    /// Wraps the world, using the only bone without parent as root.
    pub fn new(world: World) -> Self {
        let roots: Vec<Entity> = world
            .query::<&BoneName>()
            .with::<Global3>()
            .without::<Local3>()
            .iter()
            .map(|(entity, _)| entity)
            .collect();

        let root = match roots[..] {
            [root] => Some(root),
            [] => None,
            _ => {
                tracing::warn!(
                    "Rig has {} parentless bones, none is designated as root",
                    roots.len()
                );
                None
            }
        };

        SceneRig::build(world, root)
    }

    fn build(mut world: World, root: Option<Entity>) -> Self {
        update_globals(&mut world);

        let mut bones: Vec<Entity> = world
            .query::<&BoneName>()
            .iter()
            .map(|(entity, _)| entity)
            .collect();
        bones.sort_by_key(|entity| entity.id());

        let mut children: AHashMap<Entity, SmallVec<[Entity; 4]>> =
            AHashMap::new();
        for &bone in &bones {
            if let Ok(local) = world.get::<Local3>(bone) {
                children.entry(local.parent).or_default().push(bone);
            }
        }

        let root = root.filter(|&root| world_has_bone(&world, root));

        SceneRig {
            world,
            root,
            bones,
            children,
        }
    }

    pub fn bone_by_name(&self, name: &str) -> Option<Entity> {
        self.bones.iter().copied().find(|&bone| {
            self.world
                .get::<BoneName>(bone)
                .map_or(false, |bone_name| &*bone_name.0 == name)
        })
    }

    /// Rewrites globals of the bone's descendants from their locals.
    fn propagate(&mut self, bone: Entity) {
        let mut stack: SmallVec<[Entity; 16]> = SmallVec::new();
        stack.push(bone);

        while let Some(parent) = stack.pop() {
            let parent_global = match self.world.get::<Global3>(parent) {
                Ok(global) => *global,
                Err(_) => continue,
            };

            for &child in self.children.get(&parent).into_iter().flatten() {
                let local = match self.world.get::<Local3>(child) {
                    Ok(local) => *local,
                    Err(_) => continue,
                };
                if let Ok(mut global) = self.world.get_mut::<Global3>(child) {
                    *global = parent_global.append_local(&local);
                }
                stack.push(child);
            }
        }
    }
}

fn renormalize(rotation: &na::UnitQuaternion<f32>) -> na::UnitQuaternion<f32> {
    na::UnitQuaternion::new_normalize(*rotation.quaternion())
}

fn world_has_bone(world: &World, entity: Entity) -> bool {
    world.get::<BoneName>(entity).is_ok() && world.get::<Global3>(entity).is_ok()
}

impl Rig for SceneRig {
    type Bone = Entity;

    fn root_bone(&self) -> Option<Entity> {
        self.root
    }

    fn bones(&self) -> &[Entity] {
        &self.bones
    }

    fn bone_name(&self, bone: Entity) -> Option<Arc<str>> {
        self.world
            .get::<BoneName>(bone)
            .ok()
            .map(|name| name.0.clone())
    }

    fn children(&self, bone: Entity) -> &[Entity] {
        self.children
            .get(&bone)
            .map(|children| &children[..])
            .unwrap_or(&[])
    }

    fn world_transform(&self, bone: Entity) -> Option<na::Isometry3<f32>> {
        self.world.get::<Global3>(bone).ok().map(|global| global.iso)
    }

    fn set_world_rotation(
        &mut self,
        bone: Entity,
        rotation: na::UnitQuaternion<f32>,
    ) {
        let rotation = renormalize(&rotation);
        let parent = self.world.get::<Local3>(bone).ok().map(|l| l.parent);

        // Local translation is kept as is, so bone lengths never drift.
        if let Some(parent) = parent {
            let parent_rotation = self
                .world
                .get::<Global3>(parent)
                .map(|global| global.iso.rotation)
                .unwrap_or_else(|_| na::UnitQuaternion::identity());

            if let Ok(mut local) = self.world.get_mut::<Local3>(bone) {
                local.iso.rotation =
                    renormalize(&(parent_rotation.inverse() * rotation));
            }
        }

        match self.world.get_mut::<Global3>(bone) {
            Ok(mut global) => global.iso.rotation = rotation,
            Err(_) => {
                tracing::warn!("Bone {:?} is not in scene", bone);
                return;
            }
        }

        self.propagate(bone);
    }

    fn set_world_transform(
        &mut self,
        bone: Entity,
        transform: na::Isometry3<f32>,
    ) {
        let transform = na::Isometry3::from_parts(
            transform.translation,
            renormalize(&transform.rotation),
        );
        let parent = self.world.get::<Local3>(bone).ok().map(|l| l.parent);

        if let Some(parent) = parent {
            let parent_global = self
                .world
                .get::<Global3>(parent)
                .map(|global| *global)
                .unwrap_or_else(|_| Global3::identity());

            if let Ok(mut local) = self.world.get_mut::<Local3>(bone) {
                let iso = parent_global.iso.inverse() * transform;
                local.iso = na::Isometry3::from_parts(
                    iso.translation,
                    renormalize(&iso.rotation),
                );
            }
        }

        match self.world.get_mut::<Global3>(bone) {
            Ok(mut global) => global.iso = transform,
            Err(_) => {
                tracing::warn!("Bone {:?} is not in scene", bone);
                return;
            }
        }

        self.propagate(bone);
    }
}
