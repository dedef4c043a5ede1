/// Reference tolerance in Euclidean embedding distance.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Euclidean distance between two embeddings.
///
/// Embeddings of different dimensionality can never match, so they are
/// reported as infinitely far apart.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Linear-scan matcher with a fixed tolerance.
///
/// The scan stops at the first candidate within tolerance; a closer
/// candidate later in the list is never considered.
#[derive(Debug, Clone, Copy)]
pub struct FaceMatcher {
    tolerance: f32,
}

impl Default for FaceMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl FaceMatcher {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn is_match(&self, probe: &[f32], candidate: &[f32]) -> bool {
        euclidean_distance(probe, candidate) <= self.tolerance
    }

    pub fn first_match<'a, T: AsRef<[f32]>>(&self, probe: &[f32], candidates: &'a [T]) -> Option<&'a T> {
        candidates.iter().find(|c| self.is_match(probe, c.as_ref()))
    }
}
