use std::cell::OnceCell;

use glam::DVec3;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::symbolic::{Expr, Orientation, Vector};
use crate::utils::allocator::{Arena, CoordinateId, FrameId};

/// How a frame's rotation coordinate composes with its parent's orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotationConvention {
    /// Each coordinate is a joint angle relative to the parent frame.
    #[default]
    Sequential,
    /// Each coordinate is an absolute angle measured against the Newtonian frame.
    Absolute,
}

/// Sign applied to the coordinate when forming the rotation angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotationSense {
    #[default]
    Directed,
    Reversed,
}

impl RotationSense {
    pub fn sign(&self) -> f64 {
        match self {
            RotationSense::Directed => 1.0,
            RotationSense::Reversed => -1.0,
        }
    }
}

/// Single fixed-axis rotation driven by one generalized coordinate.
#[derive(Debug, Clone)]
pub struct Rotation {
    /// Unit axis, in the parent frame (sequential) or the Newtonian frame (absolute).
    pub axis: DVec3,
    pub coordinate: CoordinateId,
    pub sense: RotationSense,
    /// Fixed preload added to the coordinate.
    pub offset: Option<Expr>,
}

impl Rotation {
    /// Rotation angle `sign * (q + offset)`.
    pub fn angle(&self) -> Expr {
        let base = match &self.offset {
            Some(offset) => self.coordinate.q() + offset,
            None => self.coordinate.q(),
        };
        base.scale(self.sense.sign())
    }

    pub fn rate(&self) -> Expr {
        self.coordinate.qd().scale(self.sense.sign())
    }
}

/// A node in the frame tree.
#[derive(Debug)]
pub struct Frame {
    pub name: String,
    /// `None` for the Newtonian frame and for frames not yet rotated.
    pub parent: Option<FrameId>,
    pub rotation: Option<Rotation>,
    orientation: OnceCell<Orientation>,
    angular_velocity: OnceCell<Vector>,
}

impl Frame {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            parent: None,
            rotation: None,
            orientation: OnceCell::new(),
            angular_velocity: OnceCell::new(),
        }
    }
}

/// Tree of reference frames rooted at the Newtonian frame.
///
/// Orientation and angular velocity expressions are resolved on first use
/// and cached; rotations are write-once, so a cached value never goes stale.
#[derive(Debug)]
pub struct FrameGraph {
    frames: Arena<FrameId, Frame>,
    root: FrameId,
    convention: RotationConvention,
}

impl FrameGraph {
    pub fn new(root_name: &str, convention: RotationConvention) -> Self {
        let mut frames = Arena::new();
        let root = frames.insert(Frame::new(root_name));
        Self {
            frames,
            root,
            convention,
        }
    }

    pub fn root(&self) -> FrameId {
        self.root
    }

    pub fn convention(&self) -> RotationConvention {
        self.convention
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame(&self, id: FrameId) -> Result<&Frame> {
        Ok(self
            .frames
            .get(id)
            .ok_or(ModelError::UnknownFrame(id.index()))?)
    }

    pub fn name(&self, id: FrameId) -> Result<&str> {
        Ok(&self.frame(id)?.name)
    }

    pub fn find(&self, name: &str) -> Option<FrameId> {
        self.frames
            .iter()
            .find(|(_, frame)| frame.name == name)
            .map(|(id, _)| id)
    }

    pub fn create_frame(&mut self, name: &str) -> Result<FrameId> {
        if self.find(name).is_some() {
            return Err(ModelError::DuplicateFrameName(name.to_owned()).into());
        }
        Ok(self.frames.insert(Frame::new(name)))
    }

    /// Attaches `frame` to `parent` through a fixed-axis rotation.
    pub fn rotate(&mut self, frame: FrameId, parent: FrameId, rotation: Rotation) -> Result<()> {
        let frame_name = self.name(frame)?.to_owned();
        let parent_name = self.name(parent)?.to_owned();

        if frame == self.root {
            return Err(ModelError::RotatingNewtonian(frame_name).into());
        }
        if self.frame(frame)?.rotation.is_some() {
            return Err(ModelError::DuplicateRotation(frame_name).into());
        }
        let length = rotation.axis.length();
        if !(length > 0.0) || !length.is_finite() {
            return Err(ModelError::ZeroAxis(frame_name).into());
        }

        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == frame {
                return Err(ModelError::RotationCycle {
                    frame: frame_name,
                    parent: parent_name,
                }
                .into());
            }
            cursor = self.frame(current)?.parent;
        }

        debug!(
            "rotating frame `{frame_name}` relative to `{parent_name}` about {:?} ({:?})",
            rotation.axis, self.convention
        );

        let entry = self
            .frames
            .get_mut(frame)
            .ok_or(ModelError::UnknownFrame(frame.index()))?;
        entry.parent = Some(parent);
        entry.rotation = Some(Rotation {
            axis: rotation.axis / length,
            ..rotation
        });
        Ok(())
    }

    /// Frames from `id` up to and including the Newtonian frame.
    pub fn ancestry(&self, id: FrameId) -> Result<Vec<FrameId>> {
        let mut chain = vec![id];
        let mut current = id;
        while current != self.root {
            let frame = self.frame(current)?;
            match frame.parent {
                Some(parent) => {
                    chain.push(parent);
                    current = parent;
                }
                None => return Err(ModelError::UnrootedFrame(self.name(id)?.to_owned()).into()),
            }
        }
        Ok(chain)
    }

    /// Rotation matrix taking components in `id` to Newtonian components.
    pub fn orientation(&self, id: FrameId) -> Result<Orientation> {
        let frame = self.frame(id)?;
        if let Some(cached) = frame.orientation.get() {
            return Ok(cached.clone());
        }

        let resolved = if id == self.root {
            Orientation::identity()
        } else {
            let (parent, rotation) = self.rotation_of(id)?;
            let local = Orientation::about_axis(rotation.axis, &rotation.angle());
            match self.convention {
                RotationConvention::Sequential => self.orientation(parent)?.compose(&local),
                RotationConvention::Absolute => {
                    self.ancestry(parent)?;
                    local
                }
            }
        };
        Ok(frame.orientation.get_or_init(|| resolved).clone())
    }

    /// Unit vectors `[x, y, z]` of the frame in Newtonian components.
    pub fn basis(&self, id: FrameId) -> Result<[Vector; 3]> {
        let r = self.orientation(id)?;
        Ok([r.column(0), r.column(1), r.column(2)])
    }

    /// Angular velocity of the frame relative to the Newtonian frame.
    pub fn angular_velocity(&self, id: FrameId) -> Result<Vector> {
        let frame = self.frame(id)?;
        if let Some(cached) = frame.angular_velocity.get() {
            return Ok(cached.clone());
        }

        let resolved = if id == self.root {
            Vector::zero()
        } else {
            let (parent, rotation) = self.rotation_of(id)?;
            let spin = Vector::from_numeric(rotation.axis).scale(&rotation.rate());
            match self.convention {
                RotationConvention::Sequential => {
                    let parent_orientation = self.orientation(parent)?;
                    &self.angular_velocity(parent)? + &parent_orientation.apply(&spin)
                }
                RotationConvention::Absolute => {
                    self.ancestry(parent)?;
                    spin
                }
            }
        };
        Ok(frame.angular_velocity.get_or_init(|| resolved).clone())
    }

    /// Angular velocity of `b` as seen from `a`.
    pub fn relative_angular_velocity(&self, a: FrameId, b: FrameId) -> Result<Vector> {
        Ok(&self.angular_velocity(b)? - &self.angular_velocity(a)?)
    }

    /// Expresses a vector given by components in `id` in Newtonian components.
    pub fn express(&self, id: FrameId, components: [Expr; 3]) -> Result<Vector> {
        let [x, y, z] = components;
        Ok(self.orientation(id)?.apply(&Vector::new(x, y, z)))
    }

    fn rotation_of(&self, id: FrameId) -> Result<(FrameId, &Rotation)> {
        let frame = self.frame(id)?;
        match (frame.parent, frame.rotation.as_ref()) {
            (Some(parent), Some(rotation)) => Ok((parent, rotation)),
            _ => Err(ModelError::UnrootedFrame(frame.name.clone()).into()),
        }
    }
}
