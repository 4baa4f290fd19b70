use nalgebra::Vector3;

// ---------------------------------------------------------------------------
// EnvironmentProbe
// ---------------------------------------------------------------------------

/// Spatial queries against caller-defined obstructions.
///
/// The only point where the solver touches the outside world: step blocking
/// and pelvis ground correction. A solver without a probe never blocks a step
/// and never corrects the pelvis.
pub trait EnvironmentProbe: Send {
    /// Sweep a sphere of `radius` from `from` to `to`. Returns the distance
    /// along the sweep to the first hit, or `None` when the path is clear.
    fn cast(&self, from: &Vector3<f32>, to: &Vector3<f32>, radius: f32) -> Option<f32>;

    /// Whether anything obstructs the path between `from` and `to`.
    fn blocked(&self, from: &Vector3<f32>, to: &Vector3<f32>, radius: f32) -> bool {
        self.cast(from, to, radius).is_some()
    }
}

impl<P: EnvironmentProbe + Sync> EnvironmentProbe for &P {
    fn cast(&self, from: &Vector3<f32>, to: &Vector3<f32>, radius: f32) -> Option<f32> {
        (**self).cast(from, to, radius)
    }
}

impl<P: EnvironmentProbe + ?Sized> EnvironmentProbe for Box<P> {
    fn cast(&self, from: &Vector3<f32>, to: &Vector3<f32>, radius: f32) -> Option<f32> {
        (**self).cast(from, to, radius)
    }

    fn blocked(&self, from: &Vector3<f32>, to: &Vector3<f32>, radius: f32) -> bool {
        (**self).blocked(from, to, radius)
    }
}
