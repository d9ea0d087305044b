//! Pinhole cameras and ray generation
//!
//! Cameras follow the OpenGL convention: the camera looks down its local
//! `-z` axis with `+y` up, and `z` is the world up axis. Rays pass through
//! pixel centers.

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use triplanar_core::{Error, Point3f, RayBatch, Result, Vector3f};

/// A camera-to-world transform with a vertical field of view
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub c2w: Matrix4<f32>,
    pub fovy_deg: f32,
}

impl Camera {
    /// Camera at `position` looking at `target`
    pub fn look_at(position: Point3f, target: Point3f, up: Vector3f, fovy_deg: f32) -> Result<Self> {
        if !(fovy_deg > 0.0 && fovy_deg < 180.0) {
            return Err(Error::Config(format!(
                "field of view must be in (0, 180) degrees, got {}",
                fovy_deg
            )));
        }

        let degenerate = || Error::Config("camera forward and up directions are degenerate".to_string());
        let forward = (target - position).try_normalize(1e-6).ok_or_else(degenerate)?;
        let right = forward.cross(&up).try_normalize(1e-6).ok_or_else(degenerate)?;
        let true_up = right.cross(&forward).normalize();

        let mut c2w = Matrix4::identity();
        c2w.fixed_view_mut::<3, 1>(0, 0).copy_from(&right);
        c2w.fixed_view_mut::<3, 1>(0, 1).copy_from(&true_up);
        c2w.fixed_view_mut::<3, 1>(0, 2).copy_from(&(-forward));
        c2w.fixed_view_mut::<3, 1>(0, 3).copy_from(&position.coords);

        Ok(Self { c2w, fovy_deg })
    }

    pub fn position(&self) -> Point3f {
        Point3f::new(self.c2w[(0, 3)], self.c2w[(1, 3)], self.c2w[(2, 3)])
    }

    /// Focal length in pixels for an image `height` pixels tall
    pub fn focal_length(&self, height: usize) -> f32 {
        0.5 * height as f32 / (0.5 * self.fovy_deg.to_radians()).tan()
    }

    /// One normalized ray per pixel, row-major from the top-left pixel
    pub fn generate_rays(&self, height: usize, width: usize) -> RayBatch {
        let focal = self.focal_length(height);
        let (cx, cy) = (0.5 * width as f32, 0.5 * height as f32);
        let rotation = self.c2w.fixed_view::<3, 3>(0, 0);
        let origin = self.position();

        let mut origins = Vec::with_capacity(height * width);
        let mut directions = Vec::with_capacity(height * width);
        for row in 0..height {
            for col in 0..width {
                let local = Vector3f::new(
                    (col as f32 + 0.5 - cx) / focal,
                    -(row as f32 + 0.5 - cy) / focal,
                    -1.0,
                );
                origins.push(origin);
                directions.push((rotation * local).normalize());
            }
        }

        RayBatch { origins, directions }
    }
}

/// `n_views` cameras evenly spaced in azimuth around the origin
pub fn spherical_cameras(
    n_views: usize,
    elevation_deg: f32,
    distance: f32,
    fovy_deg: f32,
) -> Result<Vec<Camera>> {
    if n_views == 0 {
        return Err(Error::Config("at least one view is required".to_string()));
    }
    if !(distance.is_finite() && distance > 0.0) {
        return Err(Error::Config(format!(
            "camera distance must be finite and positive, got {}",
            distance
        )));
    }

    let elevation = elevation_deg.to_radians();
    (0..n_views)
        .map(|i| {
            let azimuth = (360.0 * i as f32 / n_views as f32).to_radians();
            let position = Point3f::new(
                distance * elevation.cos() * azimuth.cos(),
                distance * elevation.cos() * azimuth.sin(),
                distance * elevation.sin(),
            );
            Camera::look_at(position, Point3f::origin(), Vector3f::z(), fovy_deg)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_center_ray_points_at_target() {
        let camera = Camera::look_at(
            Point3f::new(2.0, 0.0, 0.0),
            Point3f::origin(),
            Vector3f::z(),
            40.0,
        )
        .unwrap();

        // odd size puts a pixel center on the optical axis
        let rays = camera.generate_rays(5, 5);
        assert_eq!(rays.len(), 25);
        let center = rays.directions[12];
        assert_relative_eq!(center.x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(center.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(center.z, 0.0, epsilon = 1e-6);

        // top row looks up
        assert!(rays.directions[2].z > 0.0);
        assert!(rays.directions.iter().all(|d| (d.norm() - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_spherical_cameras() {
        let cameras = spherical_cameras(4, 0.0, 1.9, 40.0).unwrap();
        assert_eq!(cameras.len(), 4);
        for camera in &cameras {
            assert_relative_eq!(camera.position().coords.norm(), 1.9, epsilon = 1e-5);
        }
        assert_relative_eq!(cameras[1].position().y, 1.9, epsilon = 1e-5);

        let raised = spherical_cameras(1, 30.0, 2.0, 40.0).unwrap();
        assert_relative_eq!(raised[0].position().z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_invalid_cameras() {
        assert!(spherical_cameras(0, 0.0, 1.0, 40.0).is_err());
        assert!(spherical_cameras(2, 0.0, -1.0, 40.0).is_err());
        assert!(spherical_cameras(2, 90.0, 1.0, 40.0).is_err());
        assert!(Camera::look_at(Point3f::origin(), Point3f::origin(), Vector3f::z(), 40.0).is_err());
    }

    #[test]
    fn test_focal_length() {
        let camera = spherical_cameras(1, 0.0, 2.0, 90.0).unwrap()[0];
        assert_relative_eq!(camera.focal_length(64), 32.0, epsilon = 1e-4);
    }
}
