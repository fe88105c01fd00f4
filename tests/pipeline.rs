//! End-to-end pipeline run against a fixture archive served over loopback HTTP

use std::fs;
use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::{tempdir, TempDir};
use walkdir::WalkDir;

use cnn_classifier::config::ConfigurationManager;
use cnn_classifier::model::artifact::weights_path;
use cnn_classifier::stages::{self, DataIngestion};
use cnn_classifier::ClassifierError;

const IMAGES_PER_CLASS: usize = 5;

fn jpeg_bytes(seed: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(32, 32, |x, y| {
        Rgb([seed.wrapping_mul(40), (x * 8) as u8, (y * 8) as u8])
    });
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut bytes, ImageFormat::Jpeg)
        .unwrap();
    bytes.into_inner()
}

/// 10 jpg images in two classes plus entries extraction must ignore
fn fixture_archive() -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (c, class) in ["Cat", "Dog"].iter().enumerate() {
        for i in 0..IMAGES_PER_CLASS {
            zip.start_file(format!("PetImages/{class}/{i}.jpg"), options)
                .unwrap();
            zip.write_all(&jpeg_bytes((c * IMAGES_PER_CLASS + i) as u8))
                .unwrap();
        }
        zip.start_file(format!("PetImages/{class}/Thumbs.db"), options)
            .unwrap();
        zip.write_all(b"thumbnail cache").unwrap();
    }
    zip.start_file("readme.txt", options).unwrap();
    zip.write_all(b"fixture").unwrap();

    zip.finish().unwrap().into_inner()
}

/// Answer a single HTTP request with `status` and `body`, returning the URL
fn serve_once_with(status: &'static str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let header = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        );
        stream.write_all(header.as_bytes()).unwrap();
        stream.write_all(&body).unwrap();
        stream.flush().unwrap();
    });

    format!("http://{addr}/kagglecatsanddogs.zip")
}

fn serve_once(body: Vec<u8>) -> String {
    serve_once_with("200 OK", body)
}

fn write_documents(root: &Path, source_url: &str) -> (PathBuf, PathBuf) {
    let root = root.display();
    let config = format!(
        "\
artifacts_root: {root}/artifacts
data_ingestion:
  root_dir: {root}/artifacts/data_ingestion
  source_url: {source_url}
  local_data_file: {root}/artifacts/data_ingestion/data.zip
  unzip_dir: {root}/artifacts/data_ingestion
prepare_base_model:
  root_dir: {root}/artifacts/prepare_base_model
  base_model_path: {root}/artifacts/prepare_base_model/base_model
  updated_base_model_path: {root}/artifacts/prepare_base_model/base_model_updated
training:
  root_dir: {root}/artifacts/training
  trained_model_path: {root}/artifacts/training/model
evaluation:
  score_path: {root}/scores.json
"
    );
    let params = "\
AUGMENTATION: true
IMAGE_SIZE: [32, 32, 3]
BATCH_SIZE: 2
INCLUDE_TOP: false
EPOCHS: 1
CLASSES: 2
WEIGHTS: none
LEARNING_RATE: 0.01
ARCHITECTURE: compact
SEED: 7
";
    let config_path = PathBuf::from(format!("{root}/config.yaml"));
    let params_path = PathBuf::from(format!("{root}/params.yaml"));
    fs::write(&config_path, config).unwrap();
    fs::write(&params_path, params).unwrap();
    (config_path, params_path)
}

fn manager_for(source_url: &str) -> (TempDir, ConfigurationManager) {
    let dir = tempdir().unwrap();
    let (config, params) = write_documents(dir.path(), source_url);
    let manager = ConfigurationManager::new(config, params).unwrap();
    (dir, manager)
}

fn extracted_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "jpg"))
        .collect();
    files.sort();
    files
}

#[test]
fn test_full_pipeline_produces_model_and_score() {
    let url = serve_once(fixture_archive());
    let (dir, manager) = manager_for(&url);

    let summary = stages::run_data_ingestion(&manager).unwrap();
    assert_eq!(summary.extracted, 2 * IMAGES_PER_CLASS);
    assert_eq!(summary.filtered, 3);

    let unzip_dir = manager.get_data_ingestion_config().unwrap().unzip_dir;
    let pet_images = unzip_dir.join("PetImages");
    assert!(pet_images.join("Cat").is_dir());
    assert!(pet_images.join("Dog").is_dir());
    assert!(!pet_images.join("Cat/Thumbs.db").exists());
    assert!(!unzip_dir.join("readme.txt").exists());

    // extracting again changes nothing
    let before = extracted_files(&unzip_dir);
    let again = DataIngestion::new(manager.get_data_ingestion_config().unwrap())
        .unzip_and_clean()
        .unwrap();
    assert_eq!(again.extracted, 0);
    assert_eq!(again.already_present, 2 * IMAGES_PER_CLASS);
    assert_eq!(extracted_files(&unzip_dir), before);

    stages::run_prepare_base_model(&manager).unwrap();
    let history = stages::run_training(&manager).unwrap();
    assert_eq!(history.epochs.len(), 1);

    let training = manager.get_training_config().unwrap();
    assert!(weights_path(&training.trained_model_path).exists());
    assert!(training.history_path().exists());

    let score = stages::run_evaluation(&manager).unwrap();
    assert!((0.0..=1.0).contains(&score.accuracy));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("scores.json")).unwrap()).unwrap();
    let loss = json["loss"].as_f64().expect("loss is numeric");
    let accuracy = json["accuracy"].as_f64().expect("accuracy is numeric");
    assert!(loss.is_finite());
    assert!((0.0..=1.0).contains(&accuracy));
}

#[test]
fn test_invalid_source_fails_before_download() {
    let (_dir, manager) = manager_for("ftp://example.com/data.zip");
    let err = stages::run_data_ingestion(&manager).unwrap_err();
    assert!(matches!(err, ClassifierError::InvalidSource(_)));

    let local = manager.get_data_ingestion_config().unwrap().local_data_file;
    assert!(!local.exists());
}

#[test]
fn test_download_replaces_existing_archive() {
    let url = serve_once(b"fresh archive bytes".to_vec());
    let (_dir, manager) = manager_for(&url);
    let config = manager.get_data_ingestion_config().unwrap();
    fs::create_dir_all(config.local_data_file.parent().unwrap()).unwrap();
    fs::write(&config.local_data_file, b"OLD CONTENT from an earlier, longer download").unwrap();

    DataIngestion::new(config.clone()).download_file().unwrap();
    assert_eq!(fs::read(&config.local_data_file).unwrap(), b"fresh archive bytes");
}

#[test]
fn test_http_error_status_is_io_error() {
    let url = serve_once_with("404 Not Found", b"missing".to_vec());
    let (_dir, manager) = manager_for(&url);

    let err = DataIngestion::new(manager.get_data_ingestion_config().unwrap())
        .download_file()
        .unwrap_err();
    assert!(matches!(err, ClassifierError::Io(_)));
}

#[test]
fn test_missing_prepare_section_is_config_error() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    let (_, params_path) = write_documents(dir.path(), "https://example.com/data.zip");
    fs::write(
        &config_path,
        format!("artifacts_root: {}/artifacts\n", dir.path().display()),
    )
    .unwrap();

    let manager = ConfigurationManager::new(&config_path, &params_path).unwrap();
    let err = manager.get_prepare_base_model_config().unwrap_err();
    assert!(matches!(err, ClassifierError::Config(_)));
}
