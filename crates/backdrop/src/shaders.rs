//! Embedded GLSL ES 3.00 sources for the swirl background.
//!
//! The fragment stage is a raymarch through a folded "swirl" density field
//! layered over a hashed starfield. It reads exactly three uniforms (`time`,
//! `resolution`, `move`) and keeps no state between frames. Loops use integer
//! counters with fixed bounds so every backend sees the same iteration count.
//!
//! Swirl field after Matthias Hurrle (@atzedent).

/// Passes the clip-space quad position straight through.
pub const VERTEX_SHADER: &str = r"#version 300 es
in vec2 a_position;

void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

pub const FRAGMENT_SHADER: &str = r"#version 300 es
precision highp float;
uniform float time;
uniform vec2 resolution;
uniform vec2 move;
out vec4 fragColor;

const int FOLD_ITERATIONS = 5;
const int MARCH_STEPS = 120;

mat2 rotation(float a) {
    vec4 c = cos(vec4(a) - vec4(0.0, 11.0, 33.0, 0.0));
    return mat2(c.x, c.y, c.z, c.w);
}

vec2 complexSquare(vec2 a) {
    return vec2(a.x * a.x - a.y * a.y, 2.0 * a.x * a.y);
}

float hash3(vec3 p) {
    p = fract(p * vec3(12.9898, 78.233, 156.34));
    p += dot(p, p + 34.56);
    return fract(p.x * p.y * p.z);
}

float hash2(vec2 p) {
    p = fract(p * vec2(12.9898, 78.233));
    p += dot(p, p + 34.56);
    return fract(p.x * p.y);
}

float swirls(vec3 p) {
    float d = 0.0;
    vec3 c = p;
    for (int i = 0; i < FOLD_ITERATIONS; i++) {
        p = 0.45 * abs(p) / dot(p, p) - 0.45;
        vec2 yz = complexSquare(vec2(p.y, p.z));
        p = vec3(yz.y, p.x, yz.x);
        d += exp(-19.0 * abs(dot(p, c)));
    }
    return d;
}

vec3 march(vec3 p, vec3 rd) {
    float d = 0.2;
    float t = 0.0;
    float c = 0.0;
    float k = mix(0.9, 1.0, hash3(rd));
    float maxd = length(p) - 1.0;
    vec3 col = vec3(0.0);
    for (int i = 0; i < MARCH_STEPS; i++) {
        t += d * exp(-2.0 * c) * k;
        c = swirls(p + rd * t);
        if (t < 0.05 || t > maxd) {
            break;
        }
        col += vec3(c, c * c, c * c) * 0.008;
    }
    return col;
}

vec3 stars(vec2 p) {
    p = vec2(p.x - (0.17 - 0.0002 * time), p.y) * 500.0;
    vec2 id = floor(p);
    vec2 gv = fract(p) - 0.5;
    float n = hash2(id);
    float d = length(gv);
    if (n < 0.975) {
        return vec3(0.0);
    }
    return vec3(smoothstep(0.03 * n, 0.001 * n, d * d));
}

vec3 orbit(vec3 p) {
    float mn = min(resolution.x, resolution.y);
    vec2 yz = vec2(p.y, p.z) * rotation(move.y * 3.0 / mn - time * 0.05);
    p = vec3(p.x, yz.x, yz.y);
    vec2 xz = vec2(p.x, p.z) * rotation(-move.x * 3.0 / mn + time * 0.025);
    return vec3(xz.x, p.y, xz.y);
}

void main() {
    vec2 fc = gl_FragCoord.xy;
    float mn = min(resolution.x, resolution.y);
    vec2 uv = (fc - 0.5 * resolution) / mn;
    vec3 rd = normalize(vec3(uv, 1.0));
    vec3 rdd = rd;
    vec3 p = orbit(vec3(0.0, 0.0, -16.0));
    rd = orbit(rd);

    vec3 col = march(p, rd);
    col = smoothstep(vec3(-0.2), vec3(0.9), col);
    vec2 sn = 0.5 + vec2(atan(rdd.x, rdd.z), atan(length(vec2(rdd.x, rdd.z)), rdd.y)) / 6.28318;
    col = max(col, stars(sn) + stars(2.0 + sn * 2.0));

    float fade = clamp((time - 0.5) * 0.3, 0.0, 1.0);
    vec2 q = (fc / resolution * 2.0 - 1.0) * 0.7;
    float v = pow(dot(q, q), 1.8);
    col = mix(col, vec3(0.0), v);
    col = mix(vec3(0.0), col, fade);
    col = max(col, vec3(0.08));
    fragColor = vec4(col, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glsl::{GlslType, StageInterface};

    #[test]
    fn fragment_declares_exactly_three_uniforms() {
        let interface = StageInterface::parse(FRAGMENT_SHADER).expect("parse");
        let uniforms: Vec<_> = interface
            .uniforms
            .iter()
            .map(|d| (d.name.as_str(), d.ty))
            .collect();
        assert_eq!(
            uniforms,
            [
                ("time", GlslType::Float),
                ("resolution", GlslType::Vec2),
                ("move", GlslType::Vec2)
            ]
        );
        assert_eq!(interface.outputs.len(), 1);
    }

    #[test]
    fn vertex_reads_only_the_position_attribute() {
        let interface = StageInterface::parse(VERTEX_SHADER).expect("parse");
        assert!(interface.uniforms.is_empty());
        assert_eq!(interface.input_index("a_position"), Some(0));
    }
}
