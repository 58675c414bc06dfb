// --- Sphere Helpers ---
use glam::Vec3;
use rand::Rng;

/// Unit tangent at `point` pointing as close to `direction` as possible.
/// Falls back to an arbitrary tangent when `direction` is radial or zero.
pub fn tangent_at(point: Vec3, direction: Vec3) -> Vec3 {
    let normal = point.normalize_or_zero();
    let tangent = (direction - normal * direction.dot(normal)).normalize_or_zero();
    if tangent == Vec3::ZERO {
        normal.any_orthonormal_vector()
    } else {
        tangent
    }
}

/// Moves `point` by `offset` and projects the result back onto the sphere.
pub fn step_on_sphere(point: Vec3, offset: Vec3) -> Vec3 {
    let moved = (point + offset).normalize_or_zero();
    if moved == Vec3::ZERO { point } else { moved }
}

pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let len_sq = v.length_squared();
        if len_sq > 1e-6 && len_sq <= 1.0 {
            return v / len_sq.sqrt();
        }
    }
}

pub fn random_tangent<R: Rng + ?Sized>(point: Vec3, rng: &mut R) -> Vec3 {
    tangent_at(point, random_unit_vector(rng))
}
