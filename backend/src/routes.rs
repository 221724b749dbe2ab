use actix_files::{Files, NamedFile};
use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use log::{debug, info, warn};
use shared::{ErrorResponse, HealthResponse, JobOptions, JobPhase, ProgressEvent};
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::SwapError;
use crate::jobs::runner::{JobRequest, JobRunner};
use crate::storage::artifact_store::{ArtifactKind, ArtifactStore};

pub const JOB_ID_HEADER: &str = "X-Job-Id";

pub fn configure_routes(cfg: &mut web::ServiceConfig, frontend_dir: PathBuf) {
    cfg.service(web::resource("/api/swap").route(web::post().to(swap)))
        .service(web::resource("/api/jobs/{job_id}").route(web::get().to(get_job)))
        .service(web::resource("/api/jobs/{job_id}/output").route(web::get().to(get_output)))
        .service(web::resource("/api/jobs/{job_id}/download").route(web::get().to(get_download)))
        .service(web::resource("/api/health").route(web::get().to(health)))
        .service(Files::new("/", frontend_dir).index_file("index.html"));
}

fn not_found(message: &str) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse {
        error: message.to_string(),
    })
}

fn parse_job_id(raw: &str) -> Result<Uuid, HttpResponse> {
    Uuid::parse_str(raw).map_err(|_| {
        HttpResponse::BadRequest().json(ErrorResponse {
            error: "Invalid UUID format".to_string(),
        })
    })
}

/// Form checkbox values. Anything unrecognised keeps the default.
pub fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => true,
        "false" | "off" | "0" | "no" => false,
        _ => default,
    }
}

/// Reads the `source`, `target`, `enhance` and `many_faces` fields. Empty
/// file fields count as missing.
pub async fn read_swap_form(mut payload: Multipart, limit: usize) -> Result<JobRequest, Error> {
    let mut request = JobRequest {
        source: None,
        target: None,
        options: JobOptions::default(),
    };

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        let mime = field.content_type().map(|m| m.essence_str().to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if data.len() + chunk.len() > limit {
                warn!("Upload field {} exceeds {} bytes", name, limit);
                return Err(SwapError::UploadTooLarge(limit).into());
            }
            data.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "source" | "target" => {
                if data.is_empty() {
                    continue;
                }
                let image = ArtifactStore::decode_upload(&data, mime.as_deref(), limit)
                    .map_err(SwapError::from_upload)?;
                debug!(
                    "Received {} image: {}x{}, {} bytes",
                    name,
                    image.image.width(),
                    image.image.height(),
                    image.byte_len
                );
                if name == "source" {
                    request.source = Some(image);
                } else {
                    request.target = Some(image);
                }
            }
            "enhance" => {
                request.options.enhance = parse_flag(&String::from_utf8_lossy(&data), true);
            }
            "many_faces" => {
                request.options.many_faces = parse_flag(&String::from_utf8_lossy(&data), false);
            }
            other => warn!("Ignoring unknown form field: {}", other),
        }
    }

    Ok(request)
}

fn encode_event(event: &ProgressEvent) -> Result<web::Bytes, serde_json::Error> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    Ok(web::Bytes::from(line))
}

async fn swap(
    runner: web::Data<JobRunner>,
    config: web::Data<AppConfig>,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let request = read_swap_form(payload, config.server.max_upload_bytes).await?;
    let handle = runner.start(request)?;
    info!("Streaming progress for job {}", handle.job_id);

    let events = futures::stream::unfold(handle.events, |mut events| async move {
        let event = events.recv().await?;
        Some((encode_event(&event), events))
    });

    Ok(HttpResponse::Ok()
        .content_type("application/x-ndjson")
        .insert_header((JOB_ID_HEADER, handle.job_id.to_string()))
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(events))
}

async fn get_job(runner: web::Data<JobRunner>, path: web::Path<String>) -> HttpResponse {
    let job_id = match parse_job_id(&path.into_inner()) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match runner.registry().get(job_id) {
        Some(snapshot) => HttpResponse::Ok().json(snapshot),
        None => {
            info!("Job not found: {}", job_id);
            not_found("Job not found")
        }
    }
}

/// Opens an artifact of a job that finished successfully.
async fn succeeded_artifact(
    runner: &JobRunner,
    raw_id: String,
    kind: ArtifactKind,
) -> Result<NamedFile, HttpResponse> {
    let job_id = parse_job_id(&raw_id)?;
    if runner.registry().status(job_id) != Some(JobPhase::Succeeded) {
        return Err(not_found("No result available for this job"));
    }
    NamedFile::open_async(runner.store().path_for(job_id, kind))
        .await
        .map_err(|e| {
            warn!("Artifact {} for job {} is missing: {}", kind.file_name(), job_id, e);
            not_found("Result file is no longer available")
        })
}

async fn get_output(
    req: HttpRequest,
    runner: web::Data<JobRunner>,
    path: web::Path<String>,
) -> HttpResponse {
    match succeeded_artifact(&runner, path.into_inner(), ArtifactKind::Output).await {
        Ok(file) => file.into_response(&req),
        Err(response) => response,
    }
}

async fn get_download(
    req: HttpRequest,
    runner: web::Data<JobRunner>,
    path: web::Path<String>,
) -> HttpResponse {
    match succeeded_artifact(&runner, path.into_inner(), ArtifactKind::Download).await {
        Ok(file) => file
            .set_content_disposition(ContentDisposition {
                disposition: DispositionType::Attachment,
                parameters: vec![DispositionParam::Filename(
                    ArtifactKind::Download.file_name().to_string(),
                )],
            })
            .into_response(&req),
        Err(response) => response,
    }
}

async fn health(runner: web::Data<JobRunner>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        busy: runner.is_busy(),
        providers: runner.available_providers().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MISSING_INPUTS_MESSAGE;
    use crate::pipeline::testing::{
        png_bytes, sample_upload, test_app_config, FakeCollaborator, FakeOutcome, FixedHost,
    };
    use actix_web::http::header::CONTENT_TYPE;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use shared::JobSnapshot;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const BOUNDARY: &str = "----swap-test-boundary";

    enum Part<'a> {
        File(&'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn multipart_body(parts: &[Part]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::File(name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}.png\"\r\nContent-Type: image/png\r\n\r\n",
                            name, name
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value)
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn swap_request(parts: &[Part]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/swap")
            .insert_header((
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(multipart_body(parts))
    }

    fn parse_events(body: &[u8]) -> Vec<ProgressEvent> {
        body.split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_slice(line).unwrap())
            .collect()
    }

    fn setup(dir: &TempDir, collaborator: FakeCollaborator) -> (AppConfig, JobRunner) {
        let config = test_app_config(dir.path());
        let runner = JobRunner::from_config(
            &config,
            Arc::new(collaborator),
            Arc::new(FixedHost::default()),
            vec!["cpu".to_string()],
        );
        (config, runner)
    }

    macro_rules! app {
        ($config:expr, $runner:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($config.clone()))
                    .app_data(web::Data::new($runner.clone()))
                    .configure(|cfg| configure_routes(cfg, $config.server.frontend_dir.clone())),
            )
            .await
        };
    }

    #[::core::prelude::v1::test]
    fn test_parse_flag() {
        assert!(parse_flag("true", false));
        assert!(parse_flag(" On ", false));
        assert!(!parse_flag("false", true));
        assert!(!parse_flag("0", true));
        assert!(parse_flag("", true));
        assert!(!parse_flag("maybe", false));
    }

    #[actix_web::test]
    async fn test_swap_streams_events_and_serves_result() {
        let dir = TempDir::new().unwrap();
        let (config, runner) = setup(&dir, FakeCollaborator::new(FakeOutcome::WriteOutput));
        let app = app!(config, runner);
        let image = png_bytes(8, 8);

        let req = swap_request(&[
            Part::File("source", &image),
            Part::File("target", &image),
            Part::Text("enhance", "false"),
        ])
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(CONTENT_TYPE).unwrap(),
            "application/x-ndjson"
        );
        let job_id = resp
            .headers()
            .get(JOB_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let events = parse_events(&test::read_body(resp).await);
        assert_eq!(events.len(), 4);
        let last = events.last().unwrap();
        assert_eq!(last.phase, JobPhase::Succeeded);
        assert_eq!(
            last.artifact_path.as_deref(),
            Some(format!("/api/jobs/{}/download", job_id).as_str())
        );

        let req = test::TestRequest::get()
            .uri(&format!("/api/jobs/{}", job_id))
            .to_request();
        let snapshot: JobSnapshot = test::call_and_read_body_json(&app, req).await;
        assert_eq!(snapshot.status, JobPhase::Succeeded);
        assert!(!snapshot.options.enhance);
        assert_eq!(snapshot.events.len(), 4);

        let req = test::TestRequest::get()
            .uri(&format!("/api/jobs/{}/download", job_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp
            .headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("attachment"));
        assert!(disposition.contains("swapped_result.png"));

        let req = test::TestRequest::get()
            .uri(&format!("/api/jobs/{}/output", job_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "image/png");
    }

    #[actix_web::test]
    async fn test_swap_without_target_reports_missing_inputs() {
        let dir = TempDir::new().unwrap();
        let (config, runner) = setup(&dir, FakeCollaborator::new(FakeOutcome::WriteOutput));
        let app = app!(config, runner);
        let image = png_bytes(8, 8);

        let req = swap_request(&[Part::File("source", &image)]).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let events = parse_events(&test::read_body(resp).await);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, JobPhase::Failed);
        assert_eq!(events[0].message, MISSING_INPUTS_MESSAGE);
        assert!(!runner.store().root().join("jobs").exists());
    }

    #[actix_web::test]
    async fn test_upload_validation_errors() {
        let dir = TempDir::new().unwrap();
        let (mut config, runner) = setup(&dir, FakeCollaborator::new(FakeOutcome::WriteOutput));
        let app = app!(config, runner);

        let req = swap_request(&[
            Part::File("source", b"definitely not an image"),
            Part::File("target", &png_bytes(4, 4)),
        ])
        .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        config.server.max_upload_bytes = 16;
        let app = app!(config, runner);
        let req = swap_request(&[Part::File("source", &png_bytes(32, 32))]).to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[actix_web::test]
    async fn test_busy_runner_rejects_second_swap() {
        let dir = TempDir::new().unwrap();
        let (config, runner) = setup(
            &dir,
            FakeCollaborator::new(FakeOutcome::WriteOutput).with_delay(Duration::from_millis(300)),
        );
        let app = app!(config, runner);

        let first = runner
            .start(JobRequest {
                source: Some(sample_upload(8, 8)),
                target: Some(sample_upload(8, 8)),
                options: JobOptions::default(),
            })
            .unwrap();

        let image = png_bytes(8, 8);
        let req = swap_request(&[Part::File("source", &image), Part::File("target", &image)])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let health: HealthResponse = test::call_and_read_body_json(&app, req).await;
        assert!(health.busy);
        assert_eq!(health.providers, vec!["cpu".to_string()]);

        let mut events = first.events;
        let mut last = None;
        while let Some(event) = events.recv().await {
            last = Some(event);
        }
        assert_eq!(last.unwrap().phase, JobPhase::Succeeded);
    }

    #[actix_web::test]
    async fn test_job_lookup_errors() {
        let dir = TempDir::new().unwrap();
        let (config, runner) = setup(&dir, FakeCollaborator::new(FakeOutcome::WriteOutput));
        let app = app!(config, runner);

        let req = test::TestRequest::get().uri("/api/jobs/not-a-uuid").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let unknown = Uuid::new_v4();
        for suffix in ["", "/output", "/download"] {
            let req = test::TestRequest::get()
                .uri(&format!("/api/jobs/{}{}", unknown, suffix))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
        }
    }
}
