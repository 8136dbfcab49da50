//! Streaming session behaviour.
//!
//! Tests that need a real font look at `RASTERHUB_TEST_FONT` and a few
//! common system locations, and skip when none is present.

use std::path::PathBuf;

use camino::Utf8PathBuf;
use rasterhub_core::{EngineSettings, JobResult, RenderError};
use rasterhub_render::{StreamingSession, TextHints};

fn test_font() -> Option<Utf8PathBuf> {
    if let Ok(path) = std::env::var("RASTERHUB_TEST_FONT") {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Utf8PathBuf::from_path_buf(path).ok();
        }
    }
    [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
    ]
    .iter()
    .map(Utf8PathBuf::from)
    .find(|p| p.is_file())
}

fn job_json(id: &str, font: &str) -> String {
    serde_json::json!({
        "id": id,
        "font": { "path": font, "size": 72.0 },
        "text": { "content": "Hello" },
        "rendering": { "format": "pgm", "encoding": "base64", "width": 128, "height": 64 }
    })
    .to_string()
}

#[test]
fn failed_job_comes_back_as_error_line() {
    let session = StreamingSession::open(32).unwrap();
    let line = session
        .render(&job_json("job-1", "/nonexistent/font.ttf"))
        .unwrap();

    let result: JobResult = serde_json::from_str(&line).unwrap();
    assert_eq!(result.id, "job-1");
    assert_eq!(result.status, "error");
    assert!(result.error.unwrap().contains("/nonexistent/font.ttf"));
}

#[test]
fn render_after_close_fails() {
    let session = StreamingSession::open(32).unwrap();
    session.close();
    let err = session
        .render(&job_json("late", "/nonexistent/font.ttf"))
        .unwrap_err();
    assert!(matches!(err, RenderError::SessionClosed));
}

#[test]
fn cache_resize_128_to_64() {
    let session = StreamingSession::open(128).unwrap();
    assert_eq!(session.cache_stats().capacity, 128);
    session.set_cache_size(64).unwrap();
    let stats = session.cache_stats();
    assert_eq!(stats.capacity, 64);
    assert!(stats.entries <= 64);
}

#[test]
fn session_is_shareable_across_threads() {
    let session = std::sync::Arc::new(StreamingSession::open(8).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let session = std::sync::Arc::clone(&session);
            std::thread::spawn(move || {
                session
                    .render(&job_json(&format!("t{i}"), "/nonexistent/font.ttf"))
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        let line = handle.join().unwrap();
        assert!(line.contains("\"status\":\"error\""));
    }
}

#[test]
fn shrinking_a_full_cache_evicts_down_to_capacity() {
    let Some(font) = test_font() else {
        eprintln!("skipping: no test font available");
        return;
    };
    // Distinct paths give distinct cache entries even for a static font.
    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let copies: Vec<Utf8PathBuf> = (0..6)
        .map(|i| {
            let copy = dir.join(format!("copy{i}.ttf"));
            std::fs::copy(&font, &copy).unwrap();
            copy
        })
        .collect();

    let session = StreamingSession::open(16).unwrap();
    for copy in &copies {
        assert!(session.warm_up_font(copy, None).unwrap());
    }
    assert_eq!(session.cache_stats().entries, 6);

    session.set_cache_size(3).unwrap();
    let stats = session.cache_stats();
    assert_eq!(stats.capacity, 3);
    assert!(stats.entries <= 3, "{stats:?}");

    let settings = EngineSettings::new(copies[0].clone(), 128, 64, 40.0);
    let bitmap = session
        .render_to_array(&settings, "Hello", &TextHints::latin())
        .unwrap();
    assert_eq!(bitmap.shape(), (64, 128));
    assert!(!bitmap.is_blank());
    assert!(session.cache_stats().entries <= 3);
}

#[test]
fn missing_font_then_real_font_in_one_session() {
    let Some(font) = test_font() else {
        eprintln!("skipping: no test font available");
        return;
    };
    let session = StreamingSession::open(8).unwrap();

    let first: JobResult =
        serde_json::from_str(&session.render(&job_json("missing", "/nonexistent/font.ttf")).unwrap())
            .unwrap();
    let second: JobResult =
        serde_json::from_str(&session.render(&job_json("present", font.as_str())).unwrap()).unwrap();

    assert_eq!(first.status, "error");
    assert!(first.error.unwrap().contains("/nonexistent/font.ttf"));
    assert!(second.is_success(), "{:?}", second.error);
    assert_eq!(second.rendering.unwrap().width, 128);
}
