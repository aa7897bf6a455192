//! Footstep placements and support phases.

use nalgebra::{Isometry3, Vector2, Vector3};

use ambler_core::geometry::{build_frame, frame_yaw, wrap_angle};
use ambler_core::types::Side;

/// A planar foot placement: world transform, side and footprint rectangle.
#[derive(Clone, Debug)]
pub struct Footstep {
    pub side: Side,
    pub frame: Isometry3<f64>,
    /// Footprint length along the foot x axis.
    pub length: f64,
    /// Footprint width along the foot y axis.
    pub width: f64,
}

impl Footstep {
    pub fn new(side: Side, frame: Isometry3<f64>, length: f64, width: f64) -> Self {
        assert!(length > 0.0 && width > 0.0, "footprint dimensions must be > 0");
        Self {
            side,
            frame,
            length,
            width,
        }
    }

    /// Footprint corners in world frame, clockwise.
    pub fn support_polygon(&self) -> Vec<Vector2<f64>> {
        let half_l = self.length / 2.0;
        let half_w = self.width / 2.0;
        [
            (half_l, half_w),
            (half_l, -half_w),
            (-half_l, -half_w),
            (-half_l, half_w),
        ]
        .iter()
        .map(|&(x, y)| {
            let corner = self.frame * nalgebra::Point3::new(x, y, 0.0);
            Vector2::new(corner.x, corner.y)
        })
        .collect()
    }

    pub fn transformed(&self, t: &Isometry3<f64>) -> Self {
        Self {
            frame: t * self.frame,
            ..self.clone()
        }
    }
}

/// A time-bounded contact phase: one footstep (single support) or two
/// (double support), plus start/end/kick tags.
#[derive(Clone, Debug, Default)]
pub struct Support {
    pub footsteps: Vec<Footstep>,
    pub start: bool,
    pub end: bool,
    pub kick: bool,
}

impl Support {
    pub fn single(footstep: Footstep) -> Self {
        Self {
            footsteps: vec![footstep],
            ..Self::default()
        }
    }

    pub fn double(a: Footstep, b: Footstep) -> Self {
        assert_ne!(a.side, b.side, "a double support needs opposite sides");
        Self {
            footsteps: vec![a, b],
            ..Self::default()
        }
    }

    pub fn is_both(&self) -> bool {
        self.footsteps.len() == 2
    }

    /// `Left`/`Right` for a single support, `Both` for a double one.
    pub fn side(&self) -> Side {
        if self.is_both() {
            Side::Both
        } else {
            self.footsteps[0].side
        }
    }

    /// The footstep of the requested side, if present.
    pub fn footstep_frame(&self, side: Side) -> Option<Isometry3<f64>> {
        self.footsteps
            .iter()
            .find(|f| f.side == side)
            .map(|f| f.frame)
    }

    /// Centroid frame: mean translation, circular-mean yaw.
    pub fn frame(&self) -> Isometry3<f64> {
        let mut translation = Vector3::zeros();
        for footstep in &self.footsteps {
            translation += footstep.frame.translation.vector;
        }
        translation /= self.footsteps.len() as f64;

        let first_yaw = frame_yaw(&self.footsteps[0].frame.rotation);
        let mut yaw = first_yaw;
        if self.footsteps.len() == 2 {
            let second_yaw = frame_yaw(&self.footsteps[1].frame.rotation);
            yaw = first_yaw + wrap_angle(second_yaw - first_yaw) / 2.0;
        }

        build_frame(translation, yaw)
    }

    /// Convex hull of the footprint corners, clockwise.
    pub fn support_polygon(&self) -> Vec<Vector2<f64>> {
        let mut points: Vec<Vector2<f64>> = self
            .footsteps
            .iter()
            .flat_map(|f| f.support_polygon())
            .collect();
        convex_hull_clockwise(&mut points)
    }

    pub fn transformed(&self, t: &Isometry3<f64>) -> Self {
        Self {
            footsteps: self.footsteps.iter().map(|f| f.transformed(t)).collect(),
            ..self.clone()
        }
    }
}

/// Andrew's monotone chain, output clockwise (the orientation the polygon
/// constraints assume).
fn convex_hull_clockwise(points: &mut Vec<Vector2<f64>>) -> Vec<Vector2<f64>> {
    points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    points.dedup_by(|a, b| (a.x - b.x).abs() < 1e-12 && (a.y - b.y).abs() < 1e-12);

    if points.len() <= 2 {
        return points.clone();
    }

    let cross = |o: &Vector2<f64>, a: &Vector2<f64>, b: &Vector2<f64>| {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    };

    let mut lower: Vec<Vector2<f64>> = Vec::new();
    for p in points.iter() {
        while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0
        {
            lower.pop();
        }
        lower.push(*p);
    }

    let mut upper: Vec<Vector2<f64>> = Vec::new();
    for p in points.iter().rev() {
        while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0
        {
            upper.pop();
        }
        upper.push(*p);
    }

    lower.pop();
    upper.pop();
    let mut hull = lower;
    hull.extend(upper);
    // The chains above are built counterclockwise; reverse for clockwise.
    hull.reverse();
    hull
}

/// Group footsteps into a support sequence.
///
/// `footsteps[0..2]` are the current placements; every later entry is a new
/// placement reached by a single-support phase standing on the previous
/// one. `add_start_end` inserts an initial double support tagged `start`,
/// `with_double` interleaves double supports between single ones, and
/// `last_is_both` closes with a double support tagged `end` (otherwise the
/// last single support carries the tag).
pub fn make_supports(
    footsteps: &[Footstep],
    add_start_end: bool,
    with_double: bool,
    last_is_both: bool,
) -> Vec<Support> {
    assert!(footsteps.len() >= 2, "make_supports needs the two current placements");

    let mut supports = Vec::new();

    if add_start_end {
        let mut support = Support::double(footsteps[0].clone(), footsteps[1].clone());
        support.start = true;
        supports.push(support);
    }

    let n = footsteps.len();
    for i in 2..n {
        // Standing on footsteps[i - 1] while footsteps[i] lands.
        supports.push(Support::single(footsteps[i - 1].clone()));

        let is_last = i == n - 1;
        if !is_last && with_double {
            supports.push(Support::double(footsteps[i - 1].clone(), footsteps[i].clone()));
        }
    }

    if last_is_both && n >= 2 {
        let mut support = Support::double(footsteps[n - 2].clone(), footsteps[n - 1].clone());
        support.end = true;
        supports.push(support);
    } else if let Some(last) = supports.last_mut() {
        last.end = true;
    }

    supports
}
