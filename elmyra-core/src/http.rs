//! HTTP Surface - warp routes over the store and dispatcher
//!
//! Handlers never block the runtime: every store read and engine job runs on
//! tokio's blocking pool, so one slow render does not stall other requests.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::TryStreamExt;
use serde_json::json;
use tracing::{error, warn};
use warp::http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::multipart::FormData;
use warp::reply::Response;
use warp::{Buf, Filter, Rejection, Reply};

use crate::app::App;
use crate::error::{Error, Result};
use crate::resolver::{Artifact, Disposition};
use crate::version::upload_filename_at;
use crate::worker::Worker;

const FORM_LIMIT: u64 = 64 * 1024;

/// All routes of the service.
pub fn routes<W: Worker + 'static>(
    app: Arc<App<W>>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let max_upload = app.max_upload_bytes;
    let with_app = warp::any().map(move || Arc::clone(&app));

    let import_form = warp::path!("import")
        .and(warp::post())
        .and(warp::body::content_length_limit(FORM_LIMIT))
        .and(warp::body::form::<HashMap<String, String>>())
        .and(with_app.clone())
        .and_then(handle_import_form::<W>);

    let import_multipart = warp::path!("import")
        .and(warp::post())
        .and(warp::multipart::form().max_length(max_upload))
        .and(with_app.clone())
        .and_then(handle_import_multipart::<W>);

    let import_preview = warp::path!("import" / String)
        .and(warp::get())
        .and(with_app.clone())
        .and_then(handle_import_preview::<W>);

    let generate = warp::path!("generate")
        .and(warp::post())
        .and(warp::body::content_length_limit(FORM_LIMIT))
        .and(warp::body::form::<BTreeMap<String, String>>())
        .and(with_app.clone())
        .and_then(handle_generate::<W>);

    let generate_multipart = warp::path!("generate")
        .and(warp::post())
        .and(warp::multipart::form().max_length(FORM_LIMIT))
        .and(with_app.clone())
        .and_then(handle_generate_multipart::<W>);

    let visualizations = warp::path!("visualizations")
        .and(warp::get())
        .and(with_app.clone())
        .and_then(handle_visualizations::<W>);

    let upload = warp::path!("vis" / String / "upload")
        .and(warp::post())
        .and(warp::multipart::form().max_length(max_upload))
        .and(with_app.clone())
        .and_then(handle_upload::<W>);

    let update = warp::path!("vis" / String / "update")
        .and(warp::post())
        .and(with_app.clone())
        .and_then(handle_update::<W>);

    let primary = warp::path!("vis" / String / String)
        .and(warp::get())
        .and(with_app.clone())
        .and_then(handle_primary::<W>);

    let download = warp::path!("vis" / String / String / String)
        .and(warp::get())
        .and(with_app)
        .and_then(handle_download::<W>);

    import_form
        .or(import_multipart)
        .unify()
        .or(import_preview)
        .unify()
        .or(generate)
        .unify()
        .or(generate_multipart)
        .unify()
        .or(visualizations)
        .unify()
        .or(upload)
        .unify()
        .or(update)
        .unify()
        .or(primary)
        .unify()
        .or(download)
        .unify()
        .with(warp::trace::request())
}

async fn handle_import_form<W: Worker + 'static>(
    form: HashMap<String, String>,
    app: Arc<App<W>>,
) -> std::result::Result<Response, Infallible> {
    let Some(url) = form.get("url").filter(|url| !url.is_empty()).cloned() else {
        return Ok(error_reply(&Error::MissingField("url".into())));
    };

    let result = blocking(move || app.sessions().create_session(&url)).await;
    Ok(match result {
        Ok(id) => json_reply(&json!({ "importId": id })),
        Err(e) => error_reply(&e),
    })
}

async fn handle_import_multipart<W: Worker + 'static>(
    form: FormData,
    app: Arc<App<W>>,
) -> std::result::Result<Response, Infallible> {
    let parts = match read_parts(form).await {
        Ok(parts) => parts,
        Err(e) => return Ok(error_reply(&e)),
    };

    let url = parts
        .iter()
        .find(|p| p.name == "url" && !p.data.is_empty())
        .map(|p| String::from_utf8_lossy(&p.data).into_owned());
    let file = parts.into_iter().find(|p| p.name == "file");

    let result = match (url, file) {
        (Some(url), _) => blocking(move || app.sessions().create_session(&url)).await,
        (None, Some(file)) => {
            let filename = file.filename.unwrap_or_else(|| "upload".to_string());
            blocking(move || app.sessions().create_session_from_upload(&filename, &file.data)).await
        }
        (None, None) => Err(Error::MissingField("url or file".into())),
    };

    Ok(match result {
        Ok(id) => json_reply(&json!({ "importId": id })),
        Err(e) => error_reply(&e),
    })
}

async fn handle_import_preview<W: Worker + 'static>(
    id: String,
    app: Arc<App<W>>,
) -> std::result::Result<Response, Infallible> {
    let artifact = blocking(move || app.sessions().preview(&id)).await;
    Ok(artifact_reply(artifact).await)
}

async fn handle_generate<W: Worker + 'static>(
    params: BTreeMap<String, String>,
    app: Arc<App<W>>,
) -> std::result::Result<Response, Infallible> {
    let result = blocking(move || app.dispatcher.run_generate(&params)).await;
    Ok(match result {
        Ok(_) => json_reply(&json!({ "done": "true" })),
        Err(e) => error_reply(&e),
    })
}

async fn handle_generate_multipart<W: Worker + 'static>(
    form: FormData,
    app: Arc<App<W>>,
) -> std::result::Result<Response, Infallible> {
    let params: BTreeMap<String, String> = match read_parts(form).await {
        Ok(parts) => parts
            .into_iter()
            .map(|p| (p.name, String::from_utf8_lossy(&p.data).into_owned()))
            .collect(),
        Err(e) => return Ok(error_reply(&e)),
    };
    handle_generate(params, app).await
}

async fn handle_visualizations<W: Worker + 'static>(
    app: Arc<App<W>>,
) -> std::result::Result<Response, Infallible> {
    let result = blocking(move || app.store().list_all_visualizations()).await;
    Ok(match result {
        Ok(all) => json_reply(&json!({ "visualizations": all })),
        Err(e) => error_reply(&e),
    })
}

async fn handle_upload<W: Worker + 'static>(
    visualization: String,
    form: FormData,
    app: Arc<App<W>>,
) -> std::result::Result<Response, Infallible> {
    let blendfile = read_parts(form)
        .await
        .and_then(|parts| {
            parts
                .into_iter()
                .find(|p| p.name == "blendfile")
                .ok_or_else(|| Error::MissingField("blendfile".into()))
        });
    let blendfile = match blendfile {
        Ok(part) => part,
        Err(e) => return Ok(error_reply(&e)),
    };

    let result = blocking(move || {
        let dir = app.store().visualization_path(&visualization)?;
        fs::create_dir_all(&dir)?;
        let path: PathBuf = dir.join(upload_filename_at(&Utc::now()));
        fs::write(&path, &blendfile.data)?;
        app.dispatcher.run_update(&visualization, Some(path))
    })
    .await;

    Ok(match result {
        Ok(_) => json_reply(&json!({ "success": true })),
        Err(e) => error_reply(&e),
    })
}

async fn handle_update<W: Worker + 'static>(
    visualization: String,
    app: Arc<App<W>>,
) -> std::result::Result<Response, Infallible> {
    let result = blocking(move || app.dispatcher.run_update(&visualization, None)).await;
    Ok(match result {
        Ok(_) => json_reply(&json!({ "success": true })),
        Err(e) => error_reply(&e),
    })
}

async fn handle_primary<W: Worker + 'static>(
    visualization: String,
    version: String,
    app: Arc<App<W>>,
) -> std::result::Result<Response, Infallible> {
    let artifact = blocking(move || app.resolver.resolve_primary(&visualization, &version)).await;
    Ok(artifact_reply(artifact).await)
}

async fn handle_download<W: Worker + 'static>(
    visualization: String,
    version: String,
    format: String,
    app: Arc<App<W>>,
) -> std::result::Result<Response, Infallible> {
    let artifact =
        blocking(move || app.resolver.resolve(&visualization, &version, &format)).await;
    Ok(artifact_reply(artifact).await)
}

/// Runs store and engine work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Io(io::Error::other(e)))?
}

struct UploadPart {
    name: String,
    filename: Option<String>,
    data: Vec<u8>,
}

async fn read_parts(form: FormData) -> Result<Vec<UploadPart>> {
    let parts: std::result::Result<Vec<UploadPart>, warp::Error> = form
        .and_then(|part| async move {
            let name = part.name().to_string();
            let filename = part.filename().map(str::to_string);
            let data = part
                .stream()
                .try_fold(Vec::new(), |mut data, buf| async move {
                    data.extend_from_slice(buf.chunk());
                    Ok::<_, warp::Error>(data)
                })
                .await?;
            Ok::<_, warp::Error>(UploadPart { name, filename, data })
        })
        .try_collect()
        .await;

    parts.map_err(|e| Error::MissingField(format!("unreadable multipart body: {e}")))
}

fn json_reply(value: &serde_json::Value) -> Response {
    warp::reply::json(value).into_response()
}

fn error_reply(e: &Error) -> Response {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %e, "request failed");
    } else {
        warn!(error = %e, status = status.as_u16(), "request rejected");
    }
    warp::reply::with_status(warp::reply::json(&json!({ "error": e.to_string() })), status)
        .into_response()
}

async fn artifact_reply(artifact: Result<Artifact>) -> Response {
    let artifact = match artifact {
        Ok(artifact) => artifact,
        Err(e) => return error_reply(&e),
    };

    let data = match tokio::fs::read(&artifact.path).await {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return error_reply(&Error::NotFound(artifact.path.display().to_string()))
        }
        Err(e) => return error_reply(&Error::from(e)),
    };

    let mut response = Response::new(Body::from(data));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(artifact.content_type));
    if let Disposition::Attachment(filename) = &artifact.disposition {
        let value = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
        headers.insert(CONTENT_DISPOSITION, value);
    }
    response
}
