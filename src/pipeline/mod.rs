pub mod image;
pub mod matcher;
#[cfg(feature = "facial-recognition")]
pub mod face;

use anyhow::Result;
use ::image::DynamicImage;

/// Turns an image into face embeddings.
///
/// Implementations return one embedding per detected face, most confident
/// face first. An empty vector means no face was found.
pub trait FaceEncoder: Send + Sync {
    fn encode(&self, image: &DynamicImage) -> Result<Vec<Vec<f32>>>;

    /// Whether the encoder is able to run at all (models present, etc).
    fn ready(&self) -> bool {
        true
    }
}

/// Stand-in used when the crate is built without face recognition support.
pub struct UnavailableEncoder;

impl FaceEncoder for UnavailableEncoder {
    fn encode(&self, _image: &DynamicImage) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("Face recognition support is not compiled into this build")
    }

    fn ready(&self) -> bool {
        false
    }
}

/// First detected face only; extra faces in the frame are ignored.
pub fn first_face(mut embeddings: Vec<Vec<f32>>) -> Option<Vec<f32>> {
    if embeddings.is_empty() {
        None
    } else {
        Some(embeddings.swap_remove(0))
    }
}
