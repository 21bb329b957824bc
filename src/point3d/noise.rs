//! Seeded, time-varying gradient noise used by noise instructions

use glam::Vec3;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

// Displacement between consecutive time layers.
const TIME_STEP: Vec3 = Vec3::new(31.416, 17.321, 11.142);

/// Perlin noise with a permutation derived from `seed`, animated over `time`
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNoise {
    seed: u64,
    time: f32,
    perm: [u8; 512],
}

impl FlowNoise {
    pub fn new(seed: u64) -> Self {
        let mut table: Vec<u8> = (0..=255).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        table.shuffle(&mut rng);

        let mut perm = [0u8; 512];
        for (i, slot) in perm.iter_mut().enumerate() {
            *slot = table[i & 255];
        }
        Self { seed, time: 0.0, perm }
    }

    pub fn with_time(mut self, time: f32) -> Self {
        self.time = time;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Noise at `p` for the current time, roughly in `[-1, 1]`
    pub fn sample(&self, p: Vec3) -> f32 {
        let layer = self.time.floor();
        let blend = fade(self.time - layer);
        let a = self.perlin(p + TIME_STEP * layer);
        if blend == 0.0 {
            return a;
        }
        let b = self.perlin(p + TIME_STEP * (layer + 1.0));
        lerp(a, b, blend)
    }

    // Lattice coordinates are already wrapped to [0, 256].
    fn hash(&self, x: i32, y: i32, z: i32) -> u8 {
        let p = |i: i32| self.perm[(i & 255) as usize] as i32;
        self.perm[((p(p(x) + y) + z) & 511) as usize]
    }

    fn perlin(&self, p: Vec3) -> f32 {
        let cell = p.floor();
        let wrap = |c: f32| c.rem_euclid(256.0) as i32 & 255;
        let (xi, yi, zi) = (wrap(cell.x), wrap(cell.y), wrap(cell.z));
        let f = p - cell;
        let (u, v, w) = (fade(f.x), fade(f.y), fade(f.z));

        let corner = |dx: i32, dy: i32, dz: i32| {
            grad3(
                self.hash(xi + dx, yi + dy, zi + dz),
                f.x - dx as f32,
                f.y - dy as f32,
                f.z - dz as f32,
            )
        };

        let y1 = lerp(lerp(corner(0, 0, 0), corner(1, 0, 0), u), lerp(corner(0, 1, 0), corner(1, 1, 0), u), v);
        let y2 = lerp(lerp(corner(0, 0, 1), corner(1, 0, 1), u), lerp(corner(0, 1, 1), corner(1, 1, 1), u), v);
        lerp(y1, y2, w)
    }
}

#[inline]
fn grad3(hash: u8, x: f32, y: f32, z: f32) -> f32 {
    let h = hash & 15;
    let u = if h < 8 { x } else { y };
    let v = if h < 4 {
        y
    } else if h == 12 || h == 14 {
        x
    } else {
        z
    };
    (if h & 1 != 0 { -u } else { u }) + (if h & 2 != 0 { -v } else { v })
}

#[inline]
fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}

/// Fractal sum settings carried by a noise instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractalParameters {
    pub frequency: Vec3,
    pub offset: Vec3,
    pub octaves: u32,
    pub amplitude: f32,
    pub persistence: f32,
    pub lacunarity: f32,
    pub turbulent: bool,
}

impl Default for FractalParameters {
    fn default() -> Self {
        Self {
            frequency: Vec3::ONE,
            offset: Vec3::ZERO,
            octaves: 1,
            amplitude: 1.0,
            persistence: 0.5,
            lacunarity: 2.0,
            turbulent: false,
        }
    }
}

/// fBm over `octaves + 1` layers, normalised by `2^o / (2^(o+1) - 1)`
pub fn fractal_sum(noise: &FlowNoise, position: Vec3, params: &FractalParameters) -> f32 {
    let mut sum = 0.0;
    let mut frequency = params.frequency;
    let mut amplitude = params.amplitude;

    for _ in 0..=params.octaves {
        let mut t = 0.5 + 0.5 * noise.sample(frequency * position + params.offset);
        if params.turbulent {
            t = (2.0 * t - 1.0).abs();
        }
        sum += t * amplitude;
        frequency *= params.lacunarity;
        amplitude *= params.persistence;
    }

    let octaves = params.octaves.min(62);
    sum * (1u64 << octaves) as f32 / ((1u64 << (octaves + 1)) - 1) as f32
}

/// Noise generators referenced by index from compiled bytecode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoiseRegistry {
    noises: Vec<FlowNoise>,
}

impl NoiseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a generator, returning its handle
    pub fn add(&mut self, noise: FlowNoise) -> usize {
        self.noises.push(noise);
        self.noises.len() - 1
    }

    pub fn get(&self, handle: usize) -> Option<&FlowNoise> {
        self.noises.get(handle)
    }

    pub fn len(&self) -> usize {
        self.noises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.noises.is_empty()
    }

    pub fn clear(&mut self) {
        self.noises.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_is_deterministic() {
        let a = FlowNoise::new(7).with_time(1.25);
        let b = FlowNoise::new(7).with_time(1.25);
        let p = Vec3::new(0.3, 1.7, -2.2);
        assert_eq!(a.sample(p), b.sample(p));
    }

    #[test]
    fn test_seed_and_time_change_values() {
        let p = Vec3::new(0.37, 1.21, 2.73);
        let base = FlowNoise::new(1).sample(p);
        assert_ne!(base, FlowNoise::new(2).sample(p));
        assert_ne!(base, FlowNoise::new(1).with_time(0.5).sample(p));
    }

    #[test]
    fn test_noise_range() {
        let noise = FlowNoise::new(3);
        for i in 0..200 {
            let p = Vec3::new(i as f32 * 0.173, i as f32 * 0.071, i as f32 * -0.113);
            let n = noise.sample(p);
            assert!((-1.5..=1.5).contains(&n), "{} out of range", n);
        }
        assert_eq!(noise.sample(Vec3::new(1.0, 2.0, 3.0)), 0.0);
    }

    #[test]
    fn test_fractal_sum_normalisation() {
        // A lattice point has zero noise, so every octave contributes 0.5.
        let noise = FlowNoise::new(5);
        let params = FractalParameters {
            octaves: 2,
            ..FractalParameters::default()
        };
        let expected = (0.5 + 0.25 + 0.125) * 4.0 / 7.0;
        assert!((fractal_sum(&noise, Vec3::ZERO, &params) - expected).abs() < 1e-6);

        let turbulent = FractalParameters { turbulent: true, ..params };
        assert_eq!(fractal_sum(&noise, Vec3::ZERO, &turbulent), 0.0);
    }

    #[test]
    fn test_registry_handles() {
        let mut registry = NoiseRegistry::new();
        assert_eq!(registry.add(FlowNoise::new(0)), 0);
        assert_eq!(registry.add(FlowNoise::new(1)), 1);
        assert_eq!(registry.get(1).map(FlowNoise::seed), Some(1));
        assert!(registry.get(2).is_none());
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lattice_wraps_for_huge_coordinates() {
        let noise = FlowNoise::new(9).with_time(0.5);
        for p in [Vec3::new(3.0e9, 0.5, 0.5), Vec3::new(-3.0e9, 1.0e20, 0.25), Vec3::splat(f32::MAX)] {
            assert!(noise.sample(p).is_finite());
        }
        // The permutation repeats every 256 cells.
        let p = Vec3::new(0.3, 0.6, 0.9);
        let shifted = p + Vec3::new(256.0, -512.0, 0.0);
        assert!((noise.sample(p) - noise.sample(shifted)).abs() < 1e-3);
    }

    #[test]
    fn test_fractal_sum_with_many_octaves() {
        let noise = FlowNoise::new(4);
        let params = FractalParameters {
            octaves: 40,
            ..FractalParameters::default()
        };
        assert!(fractal_sum(&noise, Vec3::new(0.3, 0.7, 1.1), &params).is_finite());
    }
}
