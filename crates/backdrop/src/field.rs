//! CPU evaluation of the swirl background, pixel for pixel.
//!
//! Mirrors [`crate::shaders::FRAGMENT_SHADER`] with the same constants and
//! iteration bounds. Used by still export and to pin the shader's numeric
//! behaviour (fade, vignette, colour floor) in tests without a GPU.

use std::ops::{Add, Mul, Sub};

const FOLD_ITERATIONS: usize = 5;
const MARCH_STEPS: usize = 120;
const COLOUR_FLOOR: f32 = 0.08;
const TAU_APPROX: f32 = 6.28318;

/// The three inputs the fragment stage reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldInputs {
    pub time: f32,
    pub resolution: [f32; 2],
    pub pointer: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct V2(f32, f32);

#[derive(Debug, Clone, Copy, PartialEq)]
struct V3(f32, f32, f32);

impl Add for V2 {
    type Output = V2;
    fn add(self, o: V2) -> V2 {
        V2(self.0 + o.0, self.1 + o.1)
    }
}

impl Sub for V2 {
    type Output = V2;
    fn sub(self, o: V2) -> V2 {
        V2(self.0 - o.0, self.1 - o.1)
    }
}

impl Mul<f32> for V2 {
    type Output = V2;
    fn mul(self, s: f32) -> V2 {
        V2(self.0 * s, self.1 * s)
    }
}

impl Add for V3 {
    type Output = V3;
    fn add(self, o: V3) -> V3 {
        V3(self.0 + o.0, self.1 + o.1, self.2 + o.2)
    }
}

impl Mul<f32> for V3 {
    type Output = V3;
    fn mul(self, s: f32) -> V3 {
        V3(self.0 * s, self.1 * s, self.2 * s)
    }
}

impl V2 {
    fn dot(self, o: V2) -> f32 {
        self.0 * o.0 + self.1 * o.1
    }

    fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Row vector times a column-major 2x2 matrix.
    fn rotate(self, m: [f32; 4]) -> V2 {
        V2(self.0 * m[0] + self.1 * m[1], self.0 * m[2] + self.1 * m[3])
    }
}

impl V3 {
    fn dot(self, o: V3) -> f32 {
        self.0 * o.0 + self.1 * o.1 + self.2 * o.2
    }

    fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    fn normalize(self) -> V3 {
        let len = self.length();
        if len > 0.0 {
            self * (1.0 / len)
        } else {
            self
        }
    }

    fn abs(self) -> V3 {
        V3(self.0.abs(), self.1.abs(), self.2.abs())
    }

    fn map(self, f: impl Fn(f32) -> f32) -> V3 {
        V3(f(self.0), f(self.1), f(self.2))
    }

    fn max(self, o: V3) -> V3 {
        V3(self.0.max(o.0), self.1.max(o.1), self.2.max(o.2))
    }
}

/// GLSL `fract`: `x - floor(x)`.
pub fn fract(x: f32) -> f32 {
    x - x.floor()
}

/// GLSL `mix`.
pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// GLSL `smoothstep`, including reversed edges.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Fade-in multiplier: zero through `t = 0.5`, reaching one at `t = 0.5 + 10/3`.
pub fn fade_multiplier(time: f32) -> f32 {
    ((time - 0.5) * 0.3).clamp(0.0, 1.0)
}

/// Radial vignette weight at a fragment, zero at the centre and growing outwards.
pub fn vignette(frag_coord: [f32; 2], resolution: [f32; 2]) -> f32 {
    let q = V2(
        (frag_coord[0] / resolution[0] * 2.0 - 1.0) * 0.7,
        (frag_coord[1] / resolution[1] * 2.0 - 1.0) * 0.7,
    );
    q.dot(q).powf(1.8)
}

fn rotation(a: f32) -> [f32; 4] {
    [a.cos(), (a - 11.0).cos(), (a - 33.0).cos(), a.cos()]
}

fn hash3(p: V3) -> f32 {
    let p = V3(
        fract(p.0 * 12.9898),
        fract(p.1 * 78.233),
        fract(p.2 * 156.34),
    );
    let d = p.dot(p + V3(34.56, 34.56, 34.56));
    let p = V3(p.0 + d, p.1 + d, p.2 + d);
    fract(p.0 * p.1 * p.2)
}

fn hash2(p: V2) -> f32 {
    let p = V2(fract(p.0 * 12.9898), fract(p.1 * 78.233));
    let d = p.dot(p + V2(34.56, 34.56));
    let p = V2(p.0 + d, p.1 + d);
    fract(p.0 * p.1)
}

fn swirls(mut p: V3) -> f32 {
    let c = p;
    let mut d = 0.0;
    for _ in 0..FOLD_ITERATIONS {
        let inv = 0.45 / p.dot(p);
        p = p.abs().map(|v| v * inv - 0.45);
        let (y, z) = (p.1 * p.1 - p.2 * p.2, 2.0 * p.1 * p.2);
        p = V3(z, p.0, y);
        d += (-19.0 * p.dot(c).abs()).exp();
    }
    d
}

fn march(p: V3, rd: V3) -> V3 {
    let d = 0.2;
    let mut t = 0.0;
    let mut c: f32 = 0.0;
    let k = mix(0.9, 1.0, hash3(rd));
    let maxd = p.length() - 1.0;
    let mut col = V3(0.0, 0.0, 0.0);
    for _ in 0..MARCH_STEPS {
        t += d * (-2.0 * c).exp() * k;
        c = swirls(p + rd * t);
        if t < 0.05 || t > maxd {
            break;
        }
        col = col + V3(c, c * c, c * c) * 0.008;
    }
    col
}

fn stars(p: V2, time: f32) -> V3 {
    let p = V2(p.0 - (0.17 - 0.0002 * time), p.1) * 500.0;
    let id = V2(p.0.floor(), p.1.floor());
    let gv = V2(fract(p.0) - 0.5, fract(p.1) - 0.5);
    let n = hash2(id);
    if n < 0.975 {
        return V3(0.0, 0.0, 0.0);
    }
    let d = gv.length();
    let s = smoothstep(0.03 * n, 0.001 * n, d * d);
    V3(s, s, s)
}

fn orbit(p: V3, inputs: &FieldInputs) -> V3 {
    let mn = inputs.resolution[0].min(inputs.resolution[1]);
    let yz = V2(p.1, p.2).rotate(rotation(inputs.pointer[1] * 3.0 / mn - inputs.time * 0.05));
    let p = V3(p.0, yz.0, yz.1);
    let xz = V2(p.0, p.2).rotate(rotation(-inputs.pointer[0] * 3.0 / mn + inputs.time * 0.025));
    V3(xz.0, p.1, xz.1)
}

/// Colour of the fragment at `frag_coord` (pixel centre, bottom-left origin).
///
/// Returns opaque RGBA in `[0.08, 1]` per colour channel.
pub fn shade(frag_coord: [f32; 2], inputs: &FieldInputs) -> [f32; 4] {
    let res = V2(inputs.resolution[0], inputs.resolution[1]);
    let fc = V2(frag_coord[0], frag_coord[1]);
    let mn = res.0.min(res.1);
    let uv = (fc - res * 0.5) * (1.0 / mn);
    let rdd = V3(uv.0, uv.1, 1.0).normalize();
    let p = orbit(V3(0.0, 0.0, -16.0), inputs);
    let rd = orbit(rdd, inputs);

    let col = march(p, rd).map(|v| smoothstep(-0.2, 0.9, v));
    let sn = V2(
        0.5 + rdd.0.atan2(rdd.2) / TAU_APPROX,
        0.5 + V2(rdd.0, rdd.2).length().atan2(rdd.1) / TAU_APPROX,
    );
    let sky = stars(sn, inputs.time) + stars(V2(2.0, 2.0) + sn * 2.0, inputs.time);
    let col = col.max(sky);

    let fade = fade_multiplier(inputs.time);
    let v = vignette(frag_coord, inputs.resolution);
    let col = col
        .map(|c| mix(c, 0.0, v))
        .map(|c| mix(0.0, c, fade))
        .map(|c| c.max(COLOUR_FLOOR));
    [col.0, col.1, col.2, 1.0]
}
