//! Integration tests for the harvest pipeline using wiremock.
//!
//! A `MockServer` stands in for the drive download endpoint, so retries,
//! interstitial confirmation and content-type handling run over real HTTP
//! without touching the network. The PDF engine is never downloaded here;
//! document scenarios run only where a local PDFium binds and print a SKIP
//! line otherwise.

use image::{Rgb, RgbImage};
use pdfium_bootstrap::Bootstrap;
use pdfium_render::prelude::PdfPagePaperSize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use submission_harvest::{
    organize, run, FailureStage, HarvestConfig, HarvestConfigBuilder, HarvestProgressCallback,
    Roster, RunMode, UnknownPayloadPolicy,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// PNG of pseudo-random pixels; noise keeps the AVIF output well above the size gate.
fn noisy_png(side: u32) -> Vec<u8> {
    let mut state: u32 = 0x1234_5678;
    let img = RgbImage::from_fn(side, side, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// A locally installed PDF engine, or `None` (and a SKIP line) without one.
fn local_engine() -> Option<Bootstrap> {
    let engine = Bootstrap::from_env().allow_download(false);
    match engine.bind() {
        Ok(_) => Some(engine),
        Err(e) => {
            println!("SKIP: {e}");
            None
        }
    }
}

/// A blank PDF with `pages` A4 pages, written by the engine itself.
fn blank_pdf(engine: &Bootstrap, pages: usize) -> Vec<u8> {
    let pdfium = engine.bind().unwrap();
    let mut document = pdfium.create_new_pdf().unwrap();
    for _ in 0..pages {
        document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .unwrap();
    }
    document.save_to_bytes().unwrap()
}

fn builder_for(server: &MockServer) -> HarvestConfigBuilder {
    init_tracing();
    HarvestConfig::builder()
        .download_endpoint(format!("{}/uc", server.uri()))
        .link_host("127.0.0.1")
        .retry_pause(Duration::ZERO)
        .submission_pause(Duration::ZERO)
        .avif_speed(10)
        .min_output_bytes(256)
        .allow_engine_download(false)
}

fn config_for(server: &MockServer) -> HarvestConfig {
    builder_for(server).build().unwrap()
}

fn link(id: &str) -> String {
    format!("http://127.0.0.1/file/d/{id}/view?usp=sharing")
}

fn single_roster(rows: &[(&str, &str)]) -> Roster {
    let mut csv = String::from("Team Number,Team Name,Submission Image\n");
    for (team, url) in rows {
        csv.push_str(&format!("Team {team},Name {team},{url}\n"));
    }
    Roster::from_reader(csv.as_bytes()).unwrap()
}

async fn serve(server: &MockServer, id: &str, status: u16, body: Vec<u8>, content_type: &str) {
    Mock::given(method("GET"))
        .and(path("/uc"))
        .and(query_param("export", "download"))
        .and(query_param("id", id))
        .respond_with(ResponseTemplate::new(status).set_body_raw(body, content_type))
        .mount(server)
        .await;
}

fn listing(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entrant in std::fs::read_dir(root).unwrap() {
        let entrant = entrant.unwrap().path();
        for f in std::fs::read_dir(&entrant).unwrap() {
            files.push(f.unwrap().path());
        }
    }
    files.sort();
    files
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn single_slot_png_becomes_photo_avif() {
    let server = MockServer::start().await;
    serve(&server, "ID123", 200, noisy_png(96), "image/png").await;
    let out = tempfile::tempdir().unwrap();

    let roster = single_roster(&[("7", &link("ID123"))]);
    let report = organize(&roster, out.path(), &config_for(&server))
        .await
        .unwrap();

    assert_eq!(report.tally.succeeded, 1);
    assert_eq!(report.tally.failed, 0);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    let asset = out.path().join("7").join("Photo.avif");
    assert!(asset.exists());
    assert!(std::fs::metadata(&asset).unwrap().len() > 256);
    assert!(!out.path().join("7").join("Photo.png").exists());
    assert_eq!(report.assets, vec![asset]);
}

#[tokio::test]
async fn two_transport_failures_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uc"))
        .and(query_param("id", "FLAKY"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    serve(&server, "FLAKY", 200, noisy_png(96), "image/png").await;
    let out = tempfile::tempdir().unwrap();

    let roster = single_roster(&[("3", &link("FLAKY"))]);
    let report = organize(&roster, out.path(), &config_for(&server))
        .await
        .unwrap();

    assert_eq!(report.tally.succeeded, 1);
    assert_eq!(report.tally.failed, 0);
    assert!(out.path().join("3").join("Photo.avif").exists());

    assert_eq!(report.failures.len(), 2);
    for (i, f) in report.failures.iter().enumerate() {
        assert_eq!(f.stage, FailureStage::Download);
        assert_eq!(f.attempt, Some(i as u32 + 1));
        assert_eq!(f.detail, "HTTP 503");
        assert_eq!(f.subject, "ID FLAKY");
    }
}

#[tokio::test]
async fn exhausted_attempts_fail_the_slot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uc"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;
    let out = tempfile::tempdir().unwrap();

    let config = builder_for(&server).max_attempts(4).build().unwrap();
    let roster = single_roster(&[("9", &link("GONE"))]);
    let report = organize(&roster, out.path(), &config).await.unwrap();

    assert_eq!(report.tally.succeeded, 0);
    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.failures.len(), 4);
    assert_eq!(report.failures[3].attempt, Some(4));
    // Entrant directory exists, but holds nothing.
    assert!(out.path().join("9").is_dir());
    assert_eq!(std::fs::read_dir(out.path().join("9")).unwrap().count(), 0);
}

#[tokio::test]
async fn interstitial_page_is_confirmed_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uc"))
        .and(query_param("id", "BIG"))
        .and(query_param("confirm", "tok-42"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(noisy_png(96), "image/png"))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    let warning = r#"<html><body><form id="download-form" class="download_warning">
        <a href="/uc?export=download&amp;confirm=tok-42&amp;id=BIG">Download anyway</a>
        </form></body></html>"#;
    serve(
        &server,
        "BIG",
        200,
        warning.as_bytes().to_vec(),
        "text/html; charset=utf-8",
    )
    .await;
    let out = tempfile::tempdir().unwrap();

    let roster = single_roster(&[("12", &link("BIG"))]);
    let report = organize(&roster, out.path(), &config_for(&server))
        .await
        .unwrap();

    assert_eq!(report.tally.succeeded, 1, "{:?}", report.failures);
    assert!(report.failures.is_empty());
    assert!(out.path().join("12").join("Photo.avif").exists());
}

#[tokio::test]
async fn opaque_png_bytes_are_recovered_as_camera_native() {
    let server = MockServer::start().await;
    serve(&server, "PHONE", 200, noisy_png(96), "application/octet-stream").await;
    let out = tempfile::tempdir().unwrap();

    let roster = single_roster(&[("5", &link("PHONE"))]);
    let report = organize(&roster, out.path(), &config_for(&server))
        .await
        .unwrap();

    assert_eq!(report.tally.succeeded, 1, "{:?}", report.failures);
    let dir = out.path().join("5");
    assert!(dir.join("Photo.avif").exists());
    assert!(!dir.join("Photo.bin").exists());
    assert!(!dir.join("Photo.heic").exists());
}

#[tokio::test]
async fn zero_page_pdf_behind_generic_type_fails_and_is_kept() {
    let Some(engine) = local_engine() else { return };
    let server = MockServer::start().await;
    serve(
        &server,
        "POSTER",
        200,
        blank_pdf(&engine, 0),
        "application/octet-stream",
    )
    .await;
    let out = tempfile::tempdir().unwrap();

    let roster = single_roster(&[("21", &link("POSTER"))]);
    let report = organize(&roster, out.path(), &config_for(&server))
        .await
        .unwrap();

    assert_eq!(report.tally.failed, 1);
    let dir = out.path().join("21");
    // Signature inspection renamed the payload; the failed conversion left it in place.
    let staged = dir.join("Photo.pdf");
    assert!(staged.exists());
    assert!(!dir.join("Photo.bin").exists());
    assert!(!dir.join("Photo.avif").exists());
    assert_eq!(report.preserved_payloads, vec![staged.clone()]);

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.stage, FailureStage::Conversion);
    assert_eq!(failure.subject, staged.display().to_string());
    assert_eq!(failure.detail, "PDF has no pages");
}

#[tokio::test]
async fn pdf_poster_first_page_becomes_photo_avif() {
    let Some(engine) = local_engine() else { return };
    let server = MockServer::start().await;
    serve(&server, "DECK", 200, blank_pdf(&engine, 3), "application/pdf").await;
    let out = tempfile::tempdir().unwrap();

    let config = builder_for(&server).min_output_bytes(0).build().unwrap();
    let roster = single_roster(&[("22", &link("DECK"))]);
    let report = organize(&roster, out.path(), &config).await.unwrap();

    assert_eq!(report.tally.succeeded, 1, "{:?}", report.failures);
    let dir = out.path().join("22");
    assert!(dir.join("Photo.avif").exists());
    assert!(!dir.join("Photo.pdf").exists());
    assert!(report.preserved_payloads.is_empty());
}

#[tokio::test]
async fn reject_policy_keeps_opaque_payload() {
    let server = MockServer::start().await;
    serve(
        &server,
        "BLOB",
        200,
        b"\x00\x01\x02 opaque".to_vec(),
        "application/octet-stream",
    )
    .await;
    let out = tempfile::tempdir().unwrap();

    let config = builder_for(&server)
        .unknown_payload_policy(UnknownPayloadPolicy::Reject)
        .build()
        .unwrap();
    let roster = single_roster(&[("8", &link("BLOB"))]);
    let report = organize(&roster, out.path(), &config).await.unwrap();

    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.failures[0].stage, FailureStage::Classification);
    assert!(out.path().join("8").join("Photo.bin").exists());
}

#[tokio::test]
async fn declared_non_image_type_is_unsupported() {
    let server = MockServer::start().await;
    serve(
        &server,
        "PAGE",
        200,
        b"<html>access denied</html>".to_vec(),
        "text/html",
    )
    .await;
    let out = tempfile::tempdir().unwrap();

    let roster = single_roster(&[("4", &link("PAGE"))]);
    let report = organize(&roster, out.path(), &config_for(&server))
        .await
        .unwrap();

    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.failures[0].stage, FailureStage::Classification);
    assert!(!out.path().join("4").join("Photo.avif").exists());
}

#[tokio::test]
async fn corrupt_image_keeps_staged_file() {
    let server = MockServer::start().await;
    serve(
        &server,
        "BROKEN",
        200,
        b"\xFF\xD8\xFF\xE0 not a real jpeg".to_vec(),
        "image/jpeg",
    )
    .await;
    let out = tempfile::tempdir().unwrap();

    let roster = single_roster(&[("6", &link("BROKEN"))]);
    let report = organize(&roster, out.path(), &config_for(&server))
        .await
        .unwrap();

    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::Conversion);
    let kept = out.path().join("6").join("Photo.jpg");
    assert!(kept.exists());
    assert_eq!(report.preserved_payloads, vec![kept]);
    assert!(!out.path().join("6").join("Photo.avif").exists());
}

#[tokio::test]
async fn uncompressed_mode_keeps_raw_bytes() {
    let server = MockServer::start().await;
    let raw = b"\xFF\xD8\xFF\xE0 whatever the phone sent".to_vec();
    serve(&server, "RAW", 200, raw.clone(), "image/jpeg").await;
    let out = tempfile::tempdir().unwrap();

    let config = builder_for(&server)
        .mode(RunMode::Uncompressed)
        .build()
        .unwrap();
    let roster = single_roster(&[("2", &link("RAW"))]);
    let report = organize(&roster, out.path(), &config).await.unwrap();

    assert_eq!(report.tally.succeeded, 1);
    let kept = out.path().join("2").join("Photo.jpg");
    assert_eq!(std::fs::read(&kept).unwrap(), raw);
    assert!(!out.path().join("2").join("Photo.avif").exists());
}

#[tokio::test]
async fn large_payload_is_written_whole() {
    let server = MockServer::start().await;
    let raw: Vec<u8> = (0..3 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
    serve(&server, "BIG", 200, raw.clone(), "image/tiff").await;
    let out = tempfile::tempdir().unwrap();

    let config = builder_for(&server)
        .mode(RunMode::Uncompressed)
        .build()
        .unwrap();
    let roster = single_roster(&[("3", &link("BIG"))]);
    let report = organize(&roster, out.path(), &config).await.unwrap();

    assert_eq!(report.tally.succeeded, 1, "{:?}", report.failures);
    let kept = out.path().join("3").join("Photo.tiff");
    assert_eq!(std::fs::read(&kept).unwrap(), raw);
}

#[tokio::test]
async fn numbered_schema_fills_photo_n() {
    let server = MockServer::start().await;
    serve(&server, "A1", 200, noisy_png(96), "image/png").await;
    serve(&server, "A3", 200, noisy_png(80), "image/png").await;
    let out = tempfile::tempdir().unwrap();

    let csv = format!(
        "Team Number,Team Name,Submission Image 1,Submission Image 2,Submission Image 3,Submission Image 4\n\
         Team 30,Thirty,{},,{},\n",
        link("A1"),
        link("A3")
    );
    let roster = Roster::from_reader(csv.as_bytes()).unwrap();
    let report = organize(&roster, out.path(), &config_for(&server))
        .await
        .unwrap();

    assert_eq!(report.tally.succeeded, 2);
    assert_eq!(report.tally.failed, 0);
    assert_eq!(report.tally.empty_slots, 2);
    let dir = out.path().join("30");
    assert!(dir.join("Photo1.avif").exists());
    assert!(!dir.join("Photo2.avif").exists());
    assert!(dir.join("Photo3.avif").exists());
}

#[tokio::test]
async fn foreign_and_empty_links_never_reach_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let out = tempfile::tempdir().unwrap();

    let roster = single_roster(&[
        ("1", "https://www.dropbox.com/s/abc/photo.jpg"),
        ("2", ""),
    ]);
    let report = organize(&roster, out.path(), &config_for(&server))
        .await
        .unwrap();

    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.tally.empty_slots, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::Link);
    assert!(out.path().join("2").is_dir());
}

#[tokio::test]
async fn full_run_is_idempotent_and_logs_failures() {
    let server = MockServer::start().await;
    serve(&server, "GOOD", 200, noisy_png(96), "image/png").await;
    serve(&server, "BAD", 404, Vec::new(), "text/plain").await;
    let work = tempfile::tempdir().unwrap();

    let roster_path = work.path().join("data.csv");
    std::fs::write(
        &roster_path,
        format!(
            "Team Number,Team Name,Submission Image\n\
             Team 1,One,{}\n\
             Team 2,Two,{}\n\
             ,Ghost,{}\n",
            link("GOOD"),
            link("BAD"),
            link("GOOD")
        ),
    )
    .unwrap();
    let out_root = work.path().join("public").join("image");
    let log = work.path().join("failed.txt");
    let config = builder_for(&server)
        .max_attempts(2)
        .failure_log_path(&log)
        .build()
        .unwrap();

    let first = run(&roster_path, &out_root, &config).await.unwrap();
    let first_files = listing(&out_root);
    let second = run(&roster_path, &out_root, &config).await.unwrap();
    let second_files = listing(&out_root);

    assert_eq!(first.tally, second.tally);
    assert_eq!(first.tally.succeeded, 1);
    assert_eq!(first.tally.failed, 1);
    assert_eq!(first.tally.skipped_rows, 1);
    assert_eq!(first_files, second_files);
    assert_eq!(first_files, vec![out_root.join("1").join("Photo.avif")]);

    // Two attempts per run, appended across both runs.
    let text = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 4, "{text}");
    assert!(lines.iter().all(|l| l.starts_with("[download] ID BAD")));
    assert!(lines[1].contains("(attempt 2): HTTP 404"));
}

#[derive(Default)]
struct Recorder {
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    rows: AtomicUsize,
    total: AtomicUsize,
}

impl HarvestProgressCallback for Recorder {
    fn on_batch_start(&self, total_rows: usize) {
        self.total.store(total_rows, Ordering::SeqCst);
    }
    fn on_slot_start(&self, _e: &str, _s: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_slot_complete(&self, _e: &str, _s: &str, _a: &Path) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_slot_failed(&self, _e: &str, _s: &str, _r: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_slot_skipped(&self, _e: &str, _s: &str, _r: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }
    fn on_row_done(&self) {
        self.rows.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_callback_sees_every_slot() {
    let server = MockServer::start().await;
    serve(&server, "OK", 200, noisy_png(96), "image/png").await;
    serve(&server, "NOPE", 403, Vec::new(), "text/plain").await;
    let out = tempfile::tempdir().unwrap();

    let recorder = Arc::new(Recorder::default());
    let config = builder_for(&server)
        .max_attempts(1)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let roster = single_roster(&[("1", &link("OK")), ("2", &link("NOPE")), ("3", "")]);
    organize(&roster, out.path(), &config).await.unwrap();

    assert_eq!(recorder.total.load(Ordering::SeqCst), 3);
    assert_eq!(recorder.started.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.failed.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.skipped.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.rows.load(Ordering::SeqCst), 3);
}
