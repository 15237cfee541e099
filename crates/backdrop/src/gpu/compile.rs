use crate::device::ShaderStage;
use crate::glsl::{Declaration, GlslType, Qualifier, StageInterface};

use super::uniforms::{UniformBlock, VIEWPORT_MEMBER};

const BLOCK_NAME: &str = "BackdropParams";
const BLOCK_INSTANCE: &str = "backdrop";

/// A GLSL ES 3.00 stage rewritten into Vulkan-flavoured GLSL 450.
#[derive(Debug, Clone)]
pub(crate) struct WrappedStage {
    pub glsl: String,
    pub interface: StageInterface,
    pub block: UniformBlock,
}

/// Rewrites an ES 3.00 stage so naga accepts it.
///
/// 1. Drop `#version` and `precision` lines and loose `uniform` declarations,
///    leaving blank lines so diagnostics keep their line numbers.
/// 2. Give every `in`/`out` an explicit location in declaration order.
/// 3. Fragment stages get a std140 block holding their uniforms plus the
///    render-target size; macros map each uniform name to its block member.
/// 4. Fragment stages read `gl_FragCoord` with a bottom-left origin, matching
///    the GL convention the sources are written against.
pub(crate) fn wrap_stage(stage: ShaderStage, source: &str) -> Result<WrappedStage, String> {
    let interface = StageInterface::parse(source)?;
    if stage == ShaderStage::Vertex && !interface.uniforms.is_empty() {
        return Err("0:0: vertex stage uniforms are not supported".into());
    }

    let block = match stage {
        ShaderStage::Vertex => UniformBlock::default(),
        ShaderStage::Fragment => {
            let viewport = Declaration {
                name: VIEWPORT_MEMBER.into(),
                ty: GlslType::Vec2,
            };
            UniformBlock::new(interface.uniforms.iter().chain(std::iter::once(&viewport)))
        }
    };

    let mut body = String::with_capacity(source.len() + 256);
    let mut declarations = interface.lines.iter().peekable();
    let mut input_location = 0;
    let mut output_location = 0;
    for (index, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        if let Some((_, qualifier)) = declarations.next_if(|(at, _)| *at == index) {
            match qualifier {
                Qualifier::Uniform => {}
                Qualifier::In => {
                    body.push_str(&format!("layout(location = {input_location}) {trimmed}"));
                    input_location += 1;
                }
                Qualifier::Out => {
                    body.push_str(&format!("layout(location = {output_location}) {trimmed}"));
                    output_location += 1;
                }
            }
        } else if !(trimmed.starts_with("#version") || trimmed.starts_with("precision ")) {
            body.push_str(line);
        }
        body.push('\n');
    }

    let glsl = match stage {
        ShaderStage::Vertex => format!("#version 450\n#line 1\n{body}"),
        ShaderStage::Fragment => {
            let mut header = String::from("#version 450\n");
            header.push_str(&block.glsl(BLOCK_NAME, BLOCK_INSTANCE));
            for decl in &interface.uniforms {
                header.push_str(&format!("#define {0} {BLOCK_INSTANCE}._{0}\n", decl.name));
            }
            header.push_str(FRAGMENT_PRELUDE);
            format!("{header}#line 1\n{body}{FRAGMENT_EPILOGUE}")
        }
    };

    Ok(WrappedStage {
        glsl,
        interface,
        block,
    })
}

const FRAGMENT_PRELUDE: &str = r"vec4 backdrop_frag_coord;
#define gl_FragCoord backdrop_frag_coord
#define main backdrop_stage_main
";

const FRAGMENT_EPILOGUE: &str = r"#undef main
#undef gl_FragCoord
void main() {
    backdrop_frag_coord = vec4(
        gl_FragCoord.x,
        backdrop._backdrop_viewport.y - gl_FragCoord.y,
        gl_FragCoord.z,
        gl_FragCoord.w
    );
    backdrop_stage_main();
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::{FRAGMENT_SHADER, VERTEX_SHADER};

    #[test]
    fn vertex_inputs_get_locations() {
        let wrapped = wrap_stage(ShaderStage::Vertex, VERTEX_SHADER).expect("wrap");
        assert!(wrapped.glsl.starts_with("#version 450\n"));
        assert!(wrapped
            .glsl
            .contains("layout(location = 0) in vec2 a_position;"));
        assert!(!wrapped.glsl.contains("300 es"));
        assert!(wrapped.block.is_empty());
    }

    #[test]
    fn fragment_uniforms_move_into_block() {
        let wrapped = wrap_stage(ShaderStage::Fragment, FRAGMENT_SHADER).expect("wrap");
        let glsl = &wrapped.glsl;
        assert!(!glsl.contains("uniform float time;"));
        assert!(!glsl.contains("precision highp float;"));
        assert!(glsl.contains("#define time backdrop._time\n"));
        assert!(glsl.contains("#define resolution backdrop._resolution\n"));
        assert!(glsl.contains("#define move backdrop._move\n"));
        assert!(glsl.contains("layout(location = 0) out vec4 fragColor;"));
        assert_eq!(wrapped.block.members().len(), 4);
    }

    #[test]
    fn body_keeps_source_line_numbers() {
        let wrapped = wrap_stage(ShaderStage::Fragment, FRAGMENT_SHADER).expect("wrap");
        let body = wrapped
            .glsl
            .split_once("#line 1\n")
            .map(|(_, body)| body)
            .expect("line directive");
        let source_lines = FRAGMENT_SHADER.lines().count();
        let epilogue = FRAGMENT_EPILOGUE.lines().count();
        assert_eq!(body.lines().count(), source_lines + epilogue);
        let main_at = |text: &str| text.lines().position(|l| l.starts_with("void main()"));
        assert_eq!(main_at(body), main_at(FRAGMENT_SHADER));
    }

    #[test]
    fn vertex_uniforms_are_rejected() {
        let source = "#version 300 es\nuniform float time;\nvoid main() {}\n";
        assert!(wrap_stage(ShaderStage::Vertex, source).is_err());
    }
}
