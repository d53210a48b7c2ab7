use crate::error::{FrameGraphError, FrameGraphResult};
use crate::time::{ClockTime, RobotClock, Validity};
use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};
use nalgebra::{Matrix3, Point3, Quaternion, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::Mul;

/// Rigid relationship between two frames (rotation then translation), with the estimation error
/// of whoever produced it and the time window in which it holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "TransformFields")]
pub struct Transform {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    estimation_error: f64,
    pub validity: Validity,
}

/// Deserialized form of [`Transform`], rebuilt through [`Transform::new`].
#[derive(Deserialize)]
struct TransformFields {
    translation: Vector3<f64>,
    rotation: UnitQuaternion<f64>,
    estimation_error: f64,
    validity: Validity,
}

impl From<TransformFields> for Transform {
    fn from(fields: TransformFields) -> Self {
        Transform::new(
            fields.translation,
            fields.rotation,
            fields.estimation_error,
            fields.validity,
        )
    }
}

impl Transform {
    pub fn new(
        translation: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        estimation_error: f64,
        validity: Validity,
    ) -> Self {
        Self {
            translation,
            rotation,
            estimation_error: estimation_error.max(0.0),
            validity,
        }
    }

    /// No displacement, no error, valid forever.
    pub fn identity() -> Self {
        Self::new(
            Vector3::zeros(),
            UnitQuaternion::identity(),
            0.0,
            Validity::forever(),
        )
    }

    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(translation, UnitQuaternion::identity(), 0.0, Validity::forever())
    }

    pub fn from_rotation(rotation: UnitQuaternion<f64>) -> Self {
        Self::new(Vector3::zeros(), rotation, 0.0, Validity::forever())
    }

    /// Builds a transform from a row major 4x4 homogeneous matrix.
    /// The upper left block must be a proper rotation (orthonormal, determinant 1).
    pub fn from_matrix(
        mat: [[f64; 4]; 4],
        estimation_error: f64,
        validity: Validity,
    ) -> FrameGraphResult<Self> {
        let block = Matrix3::new(
            mat[0][0], mat[0][1], mat[0][2], //
            mat[1][0], mat[1][1], mat[1][2], //
            mat[2][0], mat[2][1], mat[2][2],
        );
        let orthogonality = (block * block.transpose() - Matrix3::identity()).abs().max();
        if !(orthogonality < 1e-6) || (block.determinant() - 1.0).abs() > 1e-6 {
            return Err(FrameGraphError::InvalidRotation(format!(
                "matrix block is not a rotation: {:?}",
                [&mat[0][..3], &mat[1][..3], &mat[2][..3]]
            )));
        }
        let rotation =
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(block));
        let translation = Vector3::new(mat[0][3], mat[1][3], mat[2][3]);
        Ok(Self::new(translation, rotation, estimation_error, validity))
    }

    /// Row major 4x4 homogeneous matrix.
    pub fn to_matrix(&self) -> [[f64; 4]; 4] {
        let r = self.rotation.to_rotation_matrix();
        let m = r.matrix();
        let t = &self.translation;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)], t.x],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)], t.y],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)], t.z],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    pub fn estimation_error(&self) -> f64 {
        self.estimation_error
    }

    /// `outer` applied after `inner`: maps points of inner's source frame into outer's
    /// destination frame. Errors add up, validity shrinks to the common window.
    pub fn compose(outer: &Transform, inner: &Transform) -> Transform {
        Transform {
            translation: outer.rotation * inner.translation + outer.translation,
            rotation: outer.rotation * inner.rotation,
            estimation_error: outer.estimation_error + inner.estimation_error,
            validity: outer.validity.overlap(&inner.validity),
        }
    }

    /// The inverse relationship. Error and validity are unchanged.
    pub fn inverse(&self) -> Transform {
        let rotation = self.rotation.inverse();
        Transform {
            translation: -(rotation * self.translation),
            rotation,
            estimation_error: self.estimation_error,
            validity: self.validity,
        }
    }

    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.rotation * point + self.translation
    }

    /// Same displacement within `tolerance`: translation distance and rotation angle (radians).
    pub fn is_numerically_equivalent(&self, other: &Transform, tolerance: f64) -> bool {
        (self.translation - other.translation).norm() <= tolerance
            && self.rotation.angle_to(&other.rotation) <= tolerance
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        // q and -q are the same rotation.
        self.translation.norm() <= tolerance && 1.0 - self.rotation.w.abs() <= tolerance
    }

    pub fn is_valid_at(&self, time: ClockTime) -> bool {
        self.validity.is_valid_at(time)
    }

    pub fn is_valid_now(&self, clock: &RobotClock) -> bool {
        self.validity.is_valid_now(clock)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        Transform::compose(&self, &rhs)
    }
}

impl Mul for &Transform {
    type Output = Transform;

    fn mul(self, rhs: &Transform) -> Transform {
        Transform::compose(self, rhs)
    }
}

impl Display for Transform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let q = self.rotation.quaternion();
        write!(
            f,
            "t=({:.6}, {:.6}, {:.6}) q=({:.6}, {:.6}, {:.6}, {:.6}) error={} valid {}",
            self.translation.x,
            self.translation.y,
            self.translation.z,
            q.i,
            q.j,
            q.k,
            q.w,
            self.estimation_error,
            self.validity
        )
    }
}

// The rotation goes on the wire as its [x, y, z, w] coefficients.
impl Encode for Transform {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        let q = self.rotation.quaternion();
        [self.translation.x, self.translation.y, self.translation.z].encode(encoder)?;
        [q.i, q.j, q.k, q.w].encode(encoder)?;
        self.estimation_error.encode(encoder)?;
        self.validity.encode(encoder)
    }
}

impl Decode<()> for Transform {
    fn decode<D: Decoder<Context = ()>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let t: [f64; 3] = Decode::decode(decoder)?;
        let [x, y, z, w]: [f64; 4] = Decode::decode(decoder)?;
        let estimation_error: f64 = Decode::decode(decoder)?;
        let validity: Validity = Decode::decode(decoder)?;
        let rotation = UnitQuaternion::try_new(Quaternion::new(w, x, y, z), f64::EPSILON)
            .ok_or_else(|| DecodeError::OtherString("degenerate rotation quaternion".to_string()))?;
        Ok(Transform::new(
            Vector3::new(t[0], t[1], t[2]),
            rotation,
            estimation_error,
            validity,
        ))
    }
}
