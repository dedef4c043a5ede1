use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::FaceEncoder;

// Model files and download locations
const SCRFD_MODEL_FILE: &str = "scrfd_500m_bnkps.onnx";
const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";
const SCRFD_MODEL_URL_HF: &str = "https://huggingface.co/ykk648/face_lib/resolve/main/face_detect/scrfd_onnx/scrfd_500m_bnkps.onnx";
const SCRFD_MODEL_URL_GH: &str = "https://github.com/deepinsight/insightface/releases/download/v0.7/scrfd_500m_bnkps.onnx";
const ARCFACE_MODEL_URL: &str = "https://huggingface.co/maze/faceX/resolve/e010b5098c3685fd00b22dd2aec6f37320e3d850/w600k_r50.onnx";

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_STRIDES: [u32; 3] = [8, 16, 32];
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const ARCFACE_INPUT_SIZE: u32 = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const MIN_FACE_PX: f32 = 8.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBbox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

/// SCRFD detector + ArcFace recognizer running on ONNX Runtime.
pub struct FaceProcessor {
    models_dir: PathBuf,
    confidence_threshold: f32,
    scrfd_session: Option<Mutex<Session>>,
    arcface_session: Option<Mutex<Session>>,
}

impl FaceProcessor {
    pub fn new(models_dir: PathBuf, confidence_threshold: f32) -> Self {
        Self {
            models_dir,
            confidence_threshold,
            scrfd_session: None,
            arcface_session: None,
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn models_loaded(&self) -> bool {
        self.scrfd_session.is_some() && self.arcface_session.is_some()
    }

    /// Fetch missing models (when allowed) and load both sessions.
    ///
    /// Failures are logged and leave the processor unloaded; encoding then
    /// reports an error per request instead of the service refusing to start.
    pub async fn initialize(&mut self, auto_download: bool) -> Result<()> {
        std::fs::create_dir_all(&self.models_dir)
            .context("Failed to create models directory")?;

        if auto_download {
            if let Err(e) = self.download_models().await {
                warn!("Face model auto-download failed: {}", e);
            }
        } else {
            info!("Face model auto-download disabled.");
        }

        if let Err(e) = self.load_models() {
            warn!("Face models not loaded: {}", e);
        }
        Ok(())
    }

    async fn download_models(&self) -> Result<()> {
        let scrfd_path = self.models_dir.join(SCRFD_MODEL_FILE);
        let arcface_path = self.models_dir.join(ARCFACE_MODEL_FILE);
        let client = self.create_http_client()?;

        if !scrfd_path.exists() {
            info!("Downloading SCRFD face detection model...");
            if let Err(e) = self.download_file(&client, SCRFD_MODEL_URL_HF, &scrfd_path).await {
                warn!("Failed to download from Hugging Face: {}. Trying GitHub...", e);
                self.download_file(&client, SCRFD_MODEL_URL_GH, &scrfd_path).await?;
            }
        }

        if !arcface_path.exists() {
            info!("Downloading ArcFace recognition model ({})...", ARCFACE_MODEL_FILE);
            self.download_file(&client, ARCFACE_MODEL_URL, &arcface_path).await?;
        }

        Ok(())
    }

    fn create_http_client(&self) -> Result<reqwest::Client> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(token) = std::env::var("HF_TOKEN") {
            if !token.is_empty() {
                info!("Using Hugging Face token for model download.");
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))?,
                );
            }
        }
        reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")
    }

    async fn download_file(&self, client: &reqwest::Client, url: &str, path: &Path) -> Result<()> {
        let response = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download model from {}", url))?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to download model: HTTP {}", response.status());
        }
        let bytes = response.bytes().await.context("Failed to read response body")?;

        // ONNX files are never this small; treat it as an error page.
        if bytes.len() < 1024 {
            anyhow::bail!("Downloaded file is suspiciously small ({} bytes), may be corrupted", bytes.len());
        }

        // Write to a temp name first so a partial download is never loaded.
        let partial = path.with_extension("onnx.part");
        std::fs::write(&partial, &bytes).with_context(|| format!("Failed to write file: {:?}", partial))?;
        std::fs::rename(&partial, path).with_context(|| format!("Failed to move model into place: {:?}", path))?;

        info!("Downloaded model to {:?} ({} bytes)", path, bytes.len());
        Ok(())
    }

    fn load_models(&mut self) -> Result<()> {
        let scrfd_path = self.models_dir.join(SCRFD_MODEL_FILE);
        let arcface_path = self.models_dir.join(ARCFACE_MODEL_FILE);

        if !scrfd_path.exists() || !arcface_path.exists() {
            anyhow::bail!(
                "Face models missing; expected SCRFD at {:?} and ArcFace at {:?}",
                scrfd_path,
                arcface_path
            );
        }

        let scrfd = Session::builder()?
            .commit_from_file(&scrfd_path)
            .context("Failed to create SCRFD session")?;
        let arc = Session::builder()?
            .commit_from_file(&arcface_path)
            .context("Failed to create ArcFace session")?;

        self.scrfd_session = Some(Mutex::new(scrfd));
        self.arcface_session = Some(Mutex::new(arc));
        info!("Face models loaded: SCRFD={:?} ArcFace={:?}", scrfd_path, arcface_path);
        Ok(())
    }

    /// Detect faces, most confident first.
    pub fn detect_faces(&self, image: &DynamicImage) -> Result<Vec<FaceBbox>> {
        let mut session = self
            .scrfd_session
            .as_ref()
            .context("Detection model not loaded")?
            .lock();
        let (data, scale) = preprocess_scrfd(image);
        let img_w = image.width() as f32;
        let img_h = image.height() as f32;

        let input_name = session.inputs[0].name.clone();
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        // Outputs are grouped by kind: scores for every stride, then boxes, then (optional) keypoints.
        if output_names.len() < SCRFD_STRIDES.len() * 2 {
            anyhow::bail!("Unexpected SCRFD model outputs: {:?}", output_names);
        }

        let side = SCRFD_INPUT_SIZE as i64;
        let input = Value::from_array((vec![1i64, 3, side, side], data))
            .context("Failed to create SCRFD input tensor")?;
        let outputs = session
            .run(ort::inputs![input_name => input])
            .context("SCRFD inference failed")?;

        let mut raw = Vec::new();
        for (i, stride) in SCRFD_STRIDES.iter().enumerate() {
            let score_name = &output_names[i];
            let bbox_name = &output_names[i + SCRFD_STRIDES.len()];
            let (Some(sv), Some(bv)) = (outputs.get(score_name.as_str()), outputs.get(bbox_name.as_str())) else {
                warn!("SCRFD stride {}: outputs {} / {} missing", stride, score_name, bbox_name);
                continue;
            };
            let (_, scores) = sv.try_extract_tensor::<f32>().context("SCRFD score tensor")?;
            let (_, boxes) = bv.try_extract_tensor::<f32>().context("SCRFD bbox tensor")?;
            raw.extend(decode_stride(
                scores,
                boxes,
                *stride,
                scale,
                (img_w, img_h),
                self.confidence_threshold,
            ));
        }

        let keep = nms(&raw, NMS_IOU_THRESHOLD);
        let faces: Vec<FaceBbox> = keep.into_iter().map(|idx| raw[idx].clone()).collect();
        debug!(candidates = raw.len(), faces = faces.len(), "SCRFD detection finished");
        Ok(faces)
    }

    /// L2-normalised ArcFace embedding for a face crop.
    pub fn recognize_face(&self, face_crop: &DynamicImage) -> Result<Vec<f32>> {
        let mut session = self
            .arcface_session
            .as_ref()
            .context("Recognition model not loaded")?
            .lock();
        let data = preprocess_arcface(face_crop);
        let input_name = session.inputs[0].name.clone();
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .context("ArcFace model has no outputs")?;

        let side = ARCFACE_INPUT_SIZE as i64;
        let input = Value::from_array((vec![1i64, 3, side, side], data))
            .context("Failed to create ArcFace input tensor")?;
        let outputs = session
            .run(ort::inputs![input_name => input])
            .context("ArcFace inference failed")?;
        let value = outputs
            .get(output_name.as_str())
            .with_context(|| format!("ArcFace output {} missing", output_name))?;
        let (_, slice) = value.try_extract_tensor::<f32>().context("ArcFace output tensor")?;

        let mut v = slice.to_vec();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            anyhow::bail!("ArcFace embedding has zero norm");
        }
        for x in &mut v {
            *x /= norm;
        }
        Ok(v)
    }
}

impl FaceEncoder for FaceProcessor {
    fn encode(&self, image: &DynamicImage) -> Result<Vec<Vec<f32>>> {
        let bboxes = self.detect_faces(image)?;
        let mut embeddings = Vec::with_capacity(bboxes.len());
        for bbox in bboxes {
            let x1 = bbox.x1.max(0.0) as u32;
            let y1 = bbox.y1.max(0.0) as u32;
            let x2 = bbox.x2.min(image.width() as f32) as u32;
            let y2 = bbox.y2.min(image.height() as f32) as u32;
            if x2 <= x1 || y2 <= y1 {
                continue;
            }
            let crop = image.crop_imm(x1, y1, x2 - x1, y2 - y1);
            embeddings.push(self.recognize_face(&crop)?);
        }
        Ok(embeddings)
    }

    fn ready(&self) -> bool {
        self.models_loaded()
    }
}

/// Letterbox into a 640x640 NCHW RGB tensor. Returns the data and the resize scale.
fn preprocess_scrfd(image: &DynamicImage) -> (Vec<f32>, f32) {
    let size = SCRFD_INPUT_SIZE;
    let (ow, oh) = (image.width() as f32, image.height() as f32);
    let scale = size as f32 / ow.max(oh);
    let nw = ((ow * scale) as u32).clamp(1, size);
    let nh = ((oh * scale) as u32).clamp(1, size);
    let resized = image.resize_exact(nw, nh, image::imageops::FilterType::Triangle);
    let mut padded = DynamicImage::new_rgb8(size, size);
    image::imageops::overlay(&mut padded, &resized, 0, 0);
    (to_nchw(&padded, SCRFD_MEAN, SCRFD_STD), scale)
}

fn preprocess_arcface(face_crop: &DynamicImage) -> Vec<f32> {
    let resized = face_crop.resize_exact(
        ARCFACE_INPUT_SIZE,
        ARCFACE_INPUT_SIZE,
        image::imageops::FilterType::Triangle,
    );
    to_nchw(&resized, ARCFACE_MEAN, ARCFACE_STD)
}

fn to_nchw(image: &DynamicImage, mean: f32, std: f32) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    let mut data = Vec::with_capacity(3 * (w * h) as usize);
    for c in 0..3 {
        for y in 0..h {
            for x in 0..w {
                let p = rgb.get_pixel(x, y);
                data.push((p[c] as f32 - mean) / std);
            }
        }
    }
    data
}

/// Decode one SCRFD stride head into boxes in original-image coordinates.
///
/// `scores` holds one value per anchor, `boxes` four distances (l, t, r, b)
/// per anchor in stride units; anchors are interleaved per grid point.
fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    stride: u32,
    scale: f32,
    (img_w, img_h): (f32, f32),
    threshold: f32,
) -> Vec<FaceBbox> {
    let width = (SCRFD_INPUT_SIZE / stride) as usize;
    let grid_points = width * width;
    if scores.is_empty() || scores.len() % grid_points != 0 || boxes.len() < scores.len() * 4 {
        warn!(
            "SCRFD stride {}: {} scores / {} box values do not fit a {}x{} grid",
            stride,
            scores.len(),
            boxes.len(),
            width,
            width
        );
        return Vec::new();
    }
    let anchors_per_point = scores.len() / grid_points;
    let stride = stride as f32;

    let mut out = Vec::new();
    for (idx, &conf) in scores.iter().enumerate() {
        if conf < threshold {
            continue;
        }
        let point = idx / anchors_per_point;
        let cy = (point / width) as f32 * stride;
        let cx = (point % width) as f32 * stride;
        let b = &boxes[idx * 4..idx * 4 + 4];

        let x1 = ((cx - b[0] * stride) / scale).clamp(0.0, img_w);
        let y1 = ((cy - b[1] * stride) / scale).clamp(0.0, img_h);
        let x2 = ((cx + b[2] * stride) / scale).clamp(0.0, img_w);
        let y2 = ((cy + b[3] * stride) / scale).clamp(0.0, img_h);
        if x2 - x1 < MIN_FACE_PX || y2 - y1 < MIN_FACE_PX {
            continue;
        }
        out.push(FaceBbox { x1, y1, x2, y2, confidence: conf });
    }
    out
}

/// Non-maximum suppression; returned indices are in descending confidence order.
fn nms(boxes: &[FaceBbox], iou_threshold: f32) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..boxes.len()).collect();
    indices.sort_by(|&a, &b| {
        boxes[b]
            .confidence
            .partial_cmp(&boxes[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut keep = Vec::new();
    let mut suppressed = vec![false; boxes.len()];
    for i in 0..indices.len() {
        let ia = indices[i];
        if suppressed[ia] {
            continue;
        }
        keep.push(ia);
        for &ib in indices.iter().skip(i + 1) {
            if !suppressed[ib] && calculate_iou(&boxes[ia], &boxes[ib]) > iou_threshold {
                suppressed[ib] = true;
            }
        }
    }
    keep
}

fn calculate_iou(a: &FaceBbox, b: &FaceBbox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);
    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }
    let intersection = (x2 - x1) * (y2 - y1);
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}
