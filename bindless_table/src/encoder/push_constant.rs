/// Push-constant layouts and encoding
///
/// A layout is built append-only: adding a field never moves the fields
/// already declared, so a shader variant that grows keeps the offsets its
/// older fields were compiled against. Offsets follow std430 alignment for
/// the three field types the variants use (mat4 and vec4 at 16 bytes, u32
/// at 4). The block size ends at the last field, without tail padding.

use glam::{Mat4, Vec4};
use crate::error::{Error, Result};
use crate::handle::{decode_binding_index, Handle, ResourceKind};

/// Type of one push-constant field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushFieldType {
    /// Column-major `mat4`
    Mat4,
    /// `vec4`
    Vec4,
    /// `uint` binding index of the given kind
    Index(ResourceKind),
}

impl PushFieldType {
    pub fn size(&self) -> u32 {
        match self {
            PushFieldType::Mat4 => 64,
            PushFieldType::Vec4 => 16,
            PushFieldType::Index(_) => 4,
        }
    }

    pub fn alignment(&self) -> u32 {
        match self {
            PushFieldType::Mat4 | PushFieldType::Vec4 => 16,
            PushFieldType::Index(_) => 4,
        }
    }
}

/// One field of a push-constant block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushField {
    pub name: &'static str,
    pub ty: PushFieldType,
    pub offset: u32,
}

/// Exact byte layout of a push-constant block
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PushConstantLayout {
    fields: Vec<PushField>,
    size: u32,
}

impl PushConstantLayout {
    /// Layout with no push constants
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> PushConstantLayoutBuilder {
        PushConstantLayoutBuilder { layout: Self::default() }
    }

    pub fn fields(&self) -> &[PushField] {
        &self.fields
    }

    /// Size in bytes of the block
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&PushField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Read an index field back from an encoded block the way a shader does
    pub fn read_index(&self, bytes: &[u8], name: &str) -> Option<u32> {
        let field = self.field(name)?;
        if !matches!(field.ty, PushFieldType::Index(_)) {
            return None;
        }
        let start = field.offset as usize;
        let raw: [u8; 4] = bytes.get(start..start + 4)?.try_into().ok()?;
        Some(decode_binding_index(u32::from_ne_bytes(raw)))
    }
}

/// Append-only layout builder
pub struct PushConstantLayoutBuilder {
    layout: PushConstantLayout,
}

impl PushConstantLayoutBuilder {
    pub fn mat4(self, name: &'static str) -> Self {
        self.field(name, PushFieldType::Mat4)
    }

    pub fn vec4(self, name: &'static str) -> Self {
        self.field(name, PushFieldType::Vec4)
    }

    pub fn index(self, name: &'static str, kind: ResourceKind) -> Self {
        self.field(name, PushFieldType::Index(kind))
    }

    pub fn field(mut self, name: &'static str, ty: PushFieldType) -> Self {
        let align = ty.alignment();
        let offset = self.layout.size.div_ceil(align) * align;
        self.layout.fields.push(PushField { name, ty, offset });
        self.layout.size = offset + ty.size();
        self
    }

    pub fn build(self) -> PushConstantLayout {
        self.layout
    }
}

/// One value to encode, in field order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PushValue {
    Mat4(Mat4),
    Vec4(Vec4),
    Handle(Handle),
}

impl PushValue {
    fn type_name(&self) -> &'static str {
        match self {
            PushValue::Mat4(_) => "mat4",
            PushValue::Vec4(_) => "vec4",
            PushValue::Handle(_) => "handle",
        }
    }
}

/// Packs values into a layout's exact byte representation
///
/// The encoder only checks shapes and kinds. Slot readiness is checked by
/// `DescriptorTable::encode` before the bytes are produced.
pub struct PushConstantEncoder<'a> {
    layout: &'a PushConstantLayout,
}

impl<'a> PushConstantEncoder<'a> {
    pub fn new(layout: &'a PushConstantLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &PushConstantLayout {
        self.layout
    }

    /// Encode one value per field, in declaration order
    pub fn encode(&self, values: &[PushValue]) -> Result<Vec<u8>> {
        let fields = self.layout.fields();
        if values.len() != fields.len() {
            return Err(Error::InvalidPipelineConfiguration(format!(
                "push-constant block expects {} values, got {}",
                fields.len(),
                values.len()
            )));
        }

        let mut bytes = vec![0u8; self.layout.size() as usize];
        for (field, value) in fields.iter().zip(values) {
            let start = field.offset as usize;
            let end = start + field.ty.size() as usize;
            match (field.ty, value) {
                (PushFieldType::Mat4, PushValue::Mat4(m)) => {
                    bytes[start..end].copy_from_slice(bytemuck::cast_slice(&m.to_cols_array()));
                }
                (PushFieldType::Vec4, PushValue::Vec4(v)) => {
                    bytes[start..end].copy_from_slice(bytemuck::cast_slice(&v.to_array()));
                }
                (PushFieldType::Index(kind), PushValue::Handle(handle)) => {
                    if handle.kind() != kind {
                        return Err(Error::KindMismatch { expected: kind, found: handle.kind() });
                    }
                    bytes[start..end].copy_from_slice(bytemuck::bytes_of(&handle.binding_index()));
                }
                (ty, value) => {
                    return Err(Error::InvalidPipelineConfiguration(format!(
                        "field '{}' is {:?}, got a {} value",
                        field.name,
                        ty,
                        value.type_name()
                    )));
                }
            }
        }

        Ok(bytes)
    }
}

#[cfg(test)]
#[path = "push_constant_tests.rs"]
mod tests;
