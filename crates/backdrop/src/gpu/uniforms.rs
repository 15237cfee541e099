use crate::device::UniformValue;
use crate::glsl::{Declaration, GlslType};

/// Name of the block member carrying the render-target size, used to flip
/// `gl_FragCoord` to a bottom-left origin.
pub(crate) const VIEWPORT_MEMBER: &str = "backdrop_viewport";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UniformMember {
    pub name: String,
    pub ty: GlslType,
    pub offset: u32,
}

/// std140 layout of the uniform block synthesized for a program.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct UniformBlock {
    members: Vec<UniformMember>,
    size: u32,
}

impl UniformBlock {
    pub fn new<'a>(decls: impl IntoIterator<Item = &'a Declaration>) -> Self {
        let mut members = Vec::new();
        let mut offset = 0;
        for decl in decls {
            offset = align_up(offset, decl.ty.std140_align());
            members.push(UniformMember {
                name: decl.name.clone(),
                ty: decl.ty,
                offset,
            });
            offset += decl.ty.size();
        }
        Self {
            members,
            size: align_up(offset, 16),
        }
    }

    pub fn members(&self) -> &[UniformMember] {
        &self.members
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn slot(&self, name: &str) -> Option<u32> {
        self.members
            .iter()
            .position(|member| member.name == name)
            .map(|slot| slot as u32)
    }

    pub fn member(&self, slot: u32) -> Option<&UniformMember> {
        self.members.get(slot as usize)
    }

    /// GLSL 450 declaration of the block, bound at set 0 binding 0.
    pub fn glsl(&self, block: &str, instance: &str) -> String {
        let mut out = format!("layout(std140, set = 0, binding = 0) uniform {block} {{\n");
        for member in &self.members {
            out.push_str(&format!("    {} _{};\n", member.ty.keyword(), member.name));
        }
        out.push_str(&format!("}} {instance};\n"));
        out
    }
}

/// CPU copy of a uniform block, uploaded when it changed since the last frame.
#[derive(Debug, Clone)]
pub(crate) struct UniformStaging {
    bytes: Vec<u8>,
    dirty: bool,
}

impl UniformStaging {
    pub fn new(block: &UniformBlock) -> Self {
        Self {
            bytes: vec![0; block.size() as usize],
            dirty: true,
        }
    }

    /// Writes `value` into `member`. Mismatched types are rejected.
    pub fn write(&mut self, member: &UniformMember, value: UniformValue) -> bool {
        let floats: &[f32] = match (&value, member.ty) {
            (UniformValue::Float(v), GlslType::Float) => std::slice::from_ref(v),
            (UniformValue::Vec2(v), GlslType::Vec2) => v.as_slice(),
            _ => return false,
        };
        let bytes: &[u8] = bytemuck::cast_slice(floats);
        let start = member.offset as usize;
        let Some(target) = self.bytes.get_mut(start..start + bytes.len()) else {
            return false;
        };
        if target != bytes {
            target.copy_from_slice(bytes);
            self.dirty = true;
        }
        true
    }

    pub fn take_dirty(&mut self) -> Option<&[u8]> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(&self.bytes)
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}
