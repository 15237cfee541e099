//! Minimal reader for the top-level declarations of a GLSL ES 3.00 stage.
//!
//! Only what the background's programs use is understood: scalar and vector
//! `float` types declared one per line as `uniform`, `in` or `out`.

/// GLSL value type supported by the uniform block and vertex attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlslType {
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl GlslType {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "float" => Some(GlslType::Float),
            "vec2" => Some(GlslType::Vec2),
            "vec3" => Some(GlslType::Vec3),
            "vec4" => Some(GlslType::Vec4),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            GlslType::Float => "float",
            GlslType::Vec2 => "vec2",
            GlslType::Vec3 => "vec3",
            GlslType::Vec4 => "vec4",
        }
    }

    pub fn components(&self) -> u32 {
        match self {
            GlslType::Float => 1,
            GlslType::Vec2 => 2,
            GlslType::Vec3 => 3,
            GlslType::Vec4 => 4,
        }
    }

    /// Base alignment in bytes under std140.
    pub fn std140_align(&self) -> u32 {
        match self {
            GlslType::Float => 4,
            GlslType::Vec2 => 8,
            GlslType::Vec3 | GlslType::Vec4 => 16,
        }
    }

    pub fn size(&self) -> u32 {
        self.components() * 4
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub ty: GlslType,
}

/// Storage qualifier that introduced a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Uniform,
    In,
    Out,
}

/// Declarations found at the start of a line, with the line they were on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageInterface {
    pub uniforms: Vec<Declaration>,
    pub inputs: Vec<Declaration>,
    pub outputs: Vec<Declaration>,
    /// Zero-based line indices of every declaration, in source order.
    pub lines: Vec<(usize, Qualifier)>,
}

impl StageInterface {
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut interface = StageInterface::default();
        for (index, line) in source.lines().enumerate() {
            let Some((qualifier, decl)) = parse_declaration(line)
                .map_err(|err| format!("0:{}: {err}", index + 1))?
            else {
                continue;
            };
            let list = match qualifier {
                Qualifier::Uniform => &mut interface.uniforms,
                Qualifier::In => &mut interface.inputs,
                Qualifier::Out => &mut interface.outputs,
            };
            if list.iter().any(|existing| existing.name == decl.name) {
                return Err(format!("0:{}: redeclaration of `{}`", index + 1, decl.name));
            }
            list.push(decl);
            interface.lines.push((index, qualifier));
        }
        Ok(interface)
    }

    pub fn uniform(&self, name: &str) -> Option<&Declaration> {
        self.uniforms.iter().find(|decl| decl.name == name)
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|decl| decl.name == name)
    }
}

/// Parses one line. `Ok(None)` means the line is not a top-level declaration.
pub fn parse_declaration(line: &str) -> Result<Option<(Qualifier, Declaration)>, String> {
    let trimmed = line.trim();
    let mut tokens = trimmed.split_whitespace();
    let qualifier = match tokens.next() {
        Some("uniform") => Qualifier::Uniform,
        Some("in") => Qualifier::In,
        Some("out") => Qualifier::Out,
        _ => return Ok(None),
    };
    let mut ty_token = tokens.next().unwrap_or_default();
    if matches!(ty_token, "lowp" | "mediump" | "highp") {
        ty_token = tokens.next().unwrap_or_default();
    }
    let ty = GlslType::parse(ty_token)
        .ok_or_else(|| format!("unsupported declaration type `{ty_token}`"))?;
    let rest: String = tokens.collect::<Vec<_>>().join(" ");
    let name = rest
        .split(';')
        .next()
        .map(str::trim)
        .filter(|name| is_identifier(name))
        .ok_or_else(|| format!("malformed declaration `{trimmed}`"))?;
    if !rest.contains(';') {
        return Err(format!("missing `;` after `{name}`"));
    }
    Ok(Some((
        qualifier,
        Declaration {
            name: name.to_string(),
            ty,
        },
    )))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
