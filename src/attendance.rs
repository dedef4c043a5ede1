//! Enrollment and recognition workflows.
//!
//! Each workflow is a straight pipeline over a pooled connection: decode the
//! submitted image, encode it, then consult or update the store. They are
//! blocking and meant to run inside `spawn_blocking`.

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::info;

use crate::db::{query, writer, DbPool, StoreError};
use crate::models::attendee::{AttendanceEvent, AttendanceRecord};
use crate::pipeline::image::decode_data_url;
use crate::pipeline::matcher::FaceMatcher;
use crate::pipeline::{first_face, FaceEncoder};

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("No face detected in the image")]
    NoFaceDetected,
    #[error("Already Exists")]
    DuplicateName(String),
    #[error("No attendees registered")]
    NoAttendeesRegistered,
    #[error("Face not recognized")]
    FaceNotRecognized,
    #[error("{0} has already marked attendance today")]
    AlreadyMarkedToday(String),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl AttendanceError {
    /// Whether the caller can fix the request; everything else is a server fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AttendanceError::Internal(_))
    }
}

impl From<StoreError> for AttendanceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateName(name) => AttendanceError::DuplicateName(name),
            other => AttendanceError::Internal(other.into()),
        }
    }
}

impl From<rusqlite::Error> for AttendanceError {
    fn from(e: rusqlite::Error) -> Self {
        AttendanceError::Internal(e.into())
    }
}

impl From<r2d2::Error> for AttendanceError {
    fn from(e: r2d2::Error) -> Self {
        AttendanceError::Internal(anyhow::anyhow!("Pool error: {}", e))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enrollment {
    pub attendee_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkedAttendance {
    pub name: String,
    pub event: AttendanceEvent,
}

fn probe_embedding(encoder: &dyn FaceEncoder, image_data: &str) -> Result<Vec<f32>, AttendanceError> {
    let image = decode_data_url(image_data)?;
    let faces = encoder.encode(&image)?;
    if faces.len() > 1 {
        tracing::debug!(faces = faces.len(), "multiple faces detected, using the first");
    }
    first_face(faces).ok_or(AttendanceError::NoFaceDetected)
}

/// Enroll `name` with the first face found in `image_data`.
pub fn enroll_attendee(
    pool: &DbPool,
    encoder: &dyn FaceEncoder,
    name: &str,
    image_data: &str,
) -> Result<Enrollment, AttendanceError> {
    let name = name.trim();
    if name.is_empty() || image_data.is_empty() {
        return Err(AttendanceError::Validation("Name and image are required"));
    }

    let embedding = probe_embedding(encoder, image_data)?;

    let conn = pool.get()?;
    let attendee_id = writer::insert_attendee(&conn, name, &embedding)?;
    info!(attendee_id, name, dim = embedding.len(), "attendee enrolled");
    Ok(Enrollment { attendee_id, name: name.to_string() })
}

/// Match the face in `image_data` against enrolled attendees and record
/// attendance for `now`'s calendar day.
pub fn recognize_and_mark(
    pool: &DbPool,
    encoder: &dyn FaceEncoder,
    matcher: &FaceMatcher,
    image_data: &str,
    now: NaiveDateTime,
) -> Result<MarkedAttendance, AttendanceError> {
    if image_data.is_empty() {
        return Err(AttendanceError::Validation("Image is required"));
    }

    let probe = probe_embedding(encoder, image_data)?;

    let conn = pool.get()?;
    let attendees = query::list_attendees(&conn)?;
    if attendees.is_empty() {
        return Err(AttendanceError::NoAttendeesRegistered);
    }

    let matched = matcher
        .first_match(&probe, &attendees)
        .ok_or(AttendanceError::FaceNotRecognized)?;

    if query::has_marked_on(&conn, matched.id, now.date())? {
        return Err(AttendanceError::AlreadyMarkedToday(matched.name.clone()));
    }
    let event = match writer::mark_attendance(&conn, matched.id, now) {
        Ok(event) => event,
        Err(StoreError::AlreadyMarked { .. }) => {
            return Err(AttendanceError::AlreadyMarkedToday(matched.name.clone()));
        }
        Err(e) => return Err(e.into()),
    };
    info!(attendee_id = matched.id, name = %matched.name, marked_at = %event.marked_at, "attendance marked");
    Ok(MarkedAttendance { name: matched.name.clone(), event })
}

/// All attendance records, newest first.
pub fn attendance_records(pool: &DbPool) -> Result<Vec<AttendanceRecord>, AttendanceError> {
    let conn = pool.get()?;
    Ok(query::list_attendance_records(&conn)?)
}

/// Number of enrolled attendees.
pub fn attendee_count(pool: &DbPool) -> Result<i64, AttendanceError> {
    let conn = pool.get()?;
    Ok(query::count_attendees(&conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use anyhow::Result;
    use base64::{engine::general_purpose, Engine as _};
    use chrono::NaiveDate;
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    /// Each non-black pixel in the top row is one "face"; its colour is the embedding.
    struct PixelEncoder;

    impl FaceEncoder for PixelEncoder {
        fn encode(&self, image: &DynamicImage) -> Result<Vec<Vec<f32>>> {
            let rgb = image.to_rgb8();
            Ok((0..rgb.width())
                .map(|x| rgb.get_pixel(x, 0))
                .filter(|p| p.0 != [0, 0, 0])
                .map(|p| p.0.iter().map(|&c| c as f32 / 255.0).collect())
                .collect())
        }
    }

    fn data_url(pixels: &[[u8; 3]]) -> String {
        let mut img = RgbImage::new(pixels.len() as u32, 1);
        for (x, p) in pixels.iter().enumerate() {
            img.put_pixel(x as u32, 0, Rgb(*p));
        }
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(&buf))
    }

    fn setup_pool() -> (TempDir, DbPool) {
        let tmp = TempDir::new().unwrap();
        let pool = db::create_pool(tmp.path().join("attendance.db"), 2).unwrap();
        (tmp, pool)
    }

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap().and_hms_opt(hour, 0, 0).unwrap()
    }

    const RED: [u8; 3] = [255, 0, 0];
    const BLUE: [u8; 3] = [0, 0, 255];
    const BLACK: [u8; 3] = [0, 0, 0];

    #[test]
    fn enroll_requires_name_and_image() {
        let (_tmp, pool) = setup_pool();
        let err = enroll_attendee(&pool, &PixelEncoder, "   ", &data_url(&[RED])).unwrap_err();
        assert!(matches!(err, AttendanceError::Validation(_)));
        let err = enroll_attendee(&pool, &PixelEncoder, "Alice", "").unwrap_err();
        assert_eq!(err.to_string(), "Name and image are required");
    }

    #[test]
    fn enroll_trims_name() {
        let (_tmp, pool) = setup_pool();
        let enrolled = enroll_attendee(&pool, &PixelEncoder, "  Alice ", &data_url(&[RED])).unwrap();
        assert_eq!(enrolled.name, "Alice");
    }

    #[test]
    fn enroll_without_face_persists_nothing() {
        let (_tmp, pool) = setup_pool();
        let err = enroll_attendee(&pool, &PixelEncoder, "Alice", &data_url(&[BLACK])).unwrap_err();
        assert!(matches!(err, AttendanceError::NoFaceDetected));
        assert_eq!(attendee_count(&pool).unwrap(), 0);
    }

    #[test]
    fn duplicate_enrollment_keeps_first_embedding() {
        let (_tmp, pool) = setup_pool();
        enroll_attendee(&pool, &PixelEncoder, "Alice", &data_url(&[RED])).unwrap();
        let err = enroll_attendee(&pool, &PixelEncoder, "Alice", &data_url(&[BLUE])).unwrap_err();
        assert!(matches!(err, AttendanceError::DuplicateName(ref n) if n == "Alice"));
        assert_eq!(err.to_string(), "Already Exists");

        let conn = pool.get().unwrap();
        let stored = query::get_attendee_by_name(&conn, "Alice").unwrap().unwrap();
        assert_eq!(stored.embedding, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn enrollment_uses_first_face_only() {
        let (_tmp, pool) = setup_pool();
        enroll_attendee(&pool, &PixelEncoder, "Alice", &data_url(&[RED, BLUE])).unwrap();
        let conn = pool.get().unwrap();
        let stored = query::get_attendee_by_name(&conn, "Alice").unwrap().unwrap();
        assert_eq!(stored.embedding, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn mark_requires_image() {
        let (_tmp, pool) = setup_pool();
        let err = recognize_and_mark(&pool, &PixelEncoder, &FaceMatcher::default(), "", at(1, 9)).unwrap_err();
        assert_eq!(err.to_string(), "Image is required");
    }

    #[test]
    fn mark_with_empty_registry() {
        let (_tmp, pool) = setup_pool();
        let err = recognize_and_mark(&pool, &PixelEncoder, &FaceMatcher::default(), &data_url(&[RED]), at(1, 9))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NoAttendeesRegistered));
    }

    #[test]
    fn mark_without_face_is_rejected_before_lookup() {
        let (_tmp, pool) = setup_pool();
        let err = recognize_and_mark(&pool, &PixelEncoder, &FaceMatcher::default(), &data_url(&[BLACK]), at(1, 9))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NoFaceDetected));
    }

    #[test]
    fn unknown_face_is_not_recognized() {
        let (_tmp, pool) = setup_pool();
        enroll_attendee(&pool, &PixelEncoder, "Alice", &data_url(&[RED])).unwrap();
        let err = recognize_and_mark(&pool, &PixelEncoder, &FaceMatcher::default(), &data_url(&[BLUE]), at(1, 9))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::FaceNotRecognized));
        assert!(attendance_records(&pool).unwrap().is_empty());
    }

    #[test]
    fn marks_once_per_day() {
        let (_tmp, pool) = setup_pool();
        let matcher = FaceMatcher::default();
        enroll_attendee(&pool, &PixelEncoder, "Alice", &data_url(&[RED])).unwrap();

        let marked = recognize_and_mark(&pool, &PixelEncoder, &matcher, &data_url(&[[250, 5, 0]]), at(1, 9)).unwrap();
        assert_eq!(marked.name, "Alice");
        assert_eq!(marked.event.marked_at, at(1, 9));

        let err = recognize_and_mark(&pool, &PixelEncoder, &matcher, &data_url(&[RED]), at(1, 15)).unwrap_err();
        assert!(matches!(err, AttendanceError::AlreadyMarkedToday(ref n) if n == "Alice"));
        assert_eq!(err.to_string(), "Alice has already marked attendance today");
        assert_eq!(attendance_records(&pool).unwrap().len(), 1);

        recognize_and_mark(&pool, &PixelEncoder, &matcher, &data_url(&[RED]), at(2, 9)).unwrap();
        assert_eq!(attendance_records(&pool).unwrap().len(), 2);
    }

    #[test]
    fn concurrent_marks_report_already_marked() {
        let (_tmp, pool) = setup_pool();
        enroll_attendee(&pool, &PixelEncoder, "Alice", &data_url(&[RED])).unwrap();
        let image = data_url(&[RED]);
        let start = std::sync::Arc::new(std::sync::Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (pool, image, start) = (pool.clone(), image.clone(), start.clone());
                std::thread::spawn(move || {
                    start.wait();
                    recognize_and_mark(&pool, &PixelEncoder, &FaceMatcher::default(), &image, at(1, 9))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err, AttendanceError::AlreadyMarkedToday(n) if n == "Alice"), "{:?}", err);
        }
        assert_eq!(attendance_records(&pool).unwrap().len(), 1);
    }

    #[test]
    fn first_enrolled_match_wins() {
        let (_tmp, pool) = setup_pool();
        // Both enrolled faces are within tolerance of the probe; the earlier one wins.
        enroll_attendee(&pool, &PixelEncoder, "First", &data_url(&[[200, 0, 0]])).unwrap();
        enroll_attendee(&pool, &PixelEncoder, "Closer", &data_url(&[[250, 0, 0]])).unwrap();

        let marked = recognize_and_mark(&pool, &PixelEncoder, &FaceMatcher::default(), &data_url(&[RED]), at(1, 9))
            .unwrap();
        assert_eq!(marked.name, "First");
    }

    #[test]
    fn malformed_image_is_internal() {
        let (_tmp, pool) = setup_pool();
        let err = enroll_attendee(&pool, &PixelEncoder, "Alice", "not-a-data-url").unwrap_err();
        assert!(!err.is_client_error());
    }
}
