/// Handle - the shared currency of the bindless table
///
/// A Handle names one live slot of one descriptor heap. Only its 16-bit index
/// ever reaches a shader (`binding_index & 0xFFFF` on the GPU side); the
/// generation and kind stay on the host and exist to catch stale references.

use std::fmt;

/// Mask applied to every `binding_index` before the shader indexes an array
pub const BINDING_INDEX_MASK: u32 = 0xFFFF;

/// Number of addressable slots per resource kind (16-bit index space)
pub const MAX_SLOTS_PER_KIND: u32 = BINDING_INDEX_MASK + 1;

const GENERATION_SHIFT: u32 = 16;
const GENERATION_BITS: u32 = 13;
const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;
const KIND_SHIFT: u32 = GENERATION_SHIFT + GENERATION_BITS;

/// Resource kind addressed by a handle
///
/// Each kind lives in its own descriptor array in the shader-visible layout
/// and therefore in its own heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// `texture2D[]` (or `sampler2D[]` for combined-sampler variants)
    SampledImage,
    /// `sampler[]`
    Sampler,
    /// `image2D[]` storage images
    StorageImage,
    /// Storage-buffer arrays
    StorageBuffer,
    /// Per-draw transform matrices (`Matrices[]`)
    Transform,
}

impl ResourceKind {
    /// All kinds, in heap order
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::SampledImage,
        ResourceKind::Sampler,
        ResourceKind::StorageImage,
        ResourceKind::StorageBuffer,
        ResourceKind::Transform,
    ];

    /// Dense index of this kind (0..5), used to address per-kind tables
    pub fn slot(&self) -> usize {
        match self {
            ResourceKind::SampledImage => 0,
            ResourceKind::Sampler => 1,
            ResourceKind::StorageImage => 2,
            ResourceKind::StorageBuffer => 3,
            ResourceKind::Transform => 4,
        }
    }

    fn tag(&self) -> u32 {
        self.slot() as u32
    }

    fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::SampledImage => "sampled image",
            ResourceKind::Sampler => "sampler",
            ResourceKind::StorageImage => "storage image",
            ResourceKind::StorageBuffer => "storage buffer",
            ResourceKind::Transform => "transform",
        };
        f.write_str(name)
    }
}

/// Identifier of one allocated descriptor slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u16,
    generation: u16,
    kind: ResourceKind,
}

impl Handle {
    /// Create a handle (heaps are the only producers of valid handles)
    pub fn new(kind: ResourceKind, index: u16, generation: u16) -> Self {
        Self { index, generation, kind }
    }

    /// Slot index inside the kind's descriptor array
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Slot generation at the time this handle was issued
    pub fn generation(&self) -> u16 {
        self.generation
    }

    /// Resource kind (which heap the handle belongs to)
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Value written into a shader-visible `binding_index` field
    pub fn binding_index(&self) -> u32 {
        u32::from(self.index) & BINDING_INDEX_MASK
    }

    /// Pack into a single u32 for host-side storage.
    ///
    /// Bits 0..16 hold the index, bits 16..29 the low 13 bits of the
    /// generation and bits 29..32 the kind tag. Shaders that receive this
    /// value still decode the correct index through `& 0xFFFF`.
    pub fn to_bits(&self) -> u32 {
        u32::from(self.index)
            | ((u32::from(self.generation) & GENERATION_MASK) << GENERATION_SHIFT)
            | (self.kind.tag() << KIND_SHIFT)
    }

    /// Unpack a value produced by `to_bits`.
    ///
    /// Only the low 13 generation bits survive packing, so the result must
    /// be compared with `matches_packed` rather than `==` against the
    /// original handle once generations exceed 8191.
    pub fn from_bits(bits: u32) -> Option<Self> {
        let kind = ResourceKind::from_tag(bits >> KIND_SHIFT)?;
        Some(Self {
            index: (bits & BINDING_INDEX_MASK) as u16,
            generation: ((bits >> GENERATION_SHIFT) & GENERATION_MASK) as u16,
            kind,
        })
    }

    /// Whether `bits` is the packed form of this handle
    pub fn matches_packed(&self, bits: u32) -> bool {
        self.to_bits() == bits
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}v{}", self.kind, self.index, self.generation)
    }
}

/// Decode a shader-visible binding index the way every shader variant does
pub fn decode_binding_index(value: u32) -> u32 {
    value & BINDING_INDEX_MASK
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
