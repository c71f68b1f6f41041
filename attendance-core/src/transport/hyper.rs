//! A [Transport](crate::transport::Transport) that serves JSON over HTTP/1 using hyper.
//!
//! The caller's IP address (without the port) is used as the user id.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use tokio::runtime;

use crate::error::AttendanceError;
use crate::service::LocationReport;
use crate::store::AttendanceStore;
use crate::transport::Transport;
use crate::{AttendanceService, Clock};

/// A file that is served verbatim, like the client page.
#[derive(Debug, Clone)]
pub struct StaticAsset {
    content_type: &'static str,
    body: &'static str,
}

pub struct HyperHttpTransport {
    bind_address: SocketAddr,
    assets: HashMap<String, StaticAsset>,
}

impl HyperHttpTransport {
    pub fn new(bind_address: SocketAddr) -> HyperHttpTransport {
        HyperHttpTransport {
            bind_address,
            assets: HashMap::new(),
        }
    }

    /// Serves `body` with the given content type for GET requests to `path`.
    pub fn with_asset(
        mut self,
        path: &str,
        content_type: &'static str,
        body: &'static str,
    ) -> HyperHttpTransport {
        self.assets
            .insert(path.to_owned(), StaticAsset { content_type, body });
        self
    }
}

impl Transport for HyperHttpTransport {
    fn run<S, C>(self, service: AttendanceService<S, C>) -> anyhow::Result<()>
    where
        S: AttendanceStore + 'static,
        C: Clock + 'static,
    {
        let bind_address = self.bind_address;
        log::info!("Hyper transport will start listening on {}", bind_address);

        let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;

        let endpoints = Arc::new(Endpoints {
            service,
            assets: self.assets,
        });

        runtime.block_on(async {
            let make_svc = make_service_fn(|conn: &AddrStream| {
                let endpoints = Arc::clone(&endpoints);
                let remote_address = conn.remote_addr();
                async move {
                    Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                        let endpoints = Arc::clone(&endpoints);
                        async move {
                            Ok::<_, Infallible>(
                                handle_request(endpoints, remote_address, req).await,
                            )
                        }
                    }))
                }
            });
            let server = Server::try_bind(&bind_address)?.serve(make_svc);
            let graceful = server.with_graceful_shutdown(shutdown_signal());

            graceful.await?;
            log::info!("Hyper transport shut down");
            Ok::<(), anyhow::Error>(())
        })
    }
}

/// What a request handler gets to work with.
struct Endpoints<S, C> {
    service: AttendanceService<S, C>,
    assets: HashMap<String, StaticAsset>,
}

#[derive(Debug, PartialEq)]
enum Route {
    /// Anything else; answered from the registered assets or with 404.
    Asset(String),
    CheckLocation { latitude: String, longitude: String },
    AttendanceStatus,
    AttendanceData,
}

impl Route {
    // older client pages request the underscore spellings, both are accepted
    fn parse(path: &str) -> Route {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            ["check-location", latitude, longitude] | ["check_location", latitude, longitude] => {
                Route::CheckLocation {
                    latitude: (*latitude).to_owned(),
                    longitude: (*longitude).to_owned(),
                }
            }
            ["check-attendance-status"] | ["check_attendance_status"] => Route::AttendanceStatus,
            ["attendance-data"] | ["attendance_data"] => Route::AttendanceData,
            _ => Route::Asset(path.to_owned()),
        }
    }
}

#[derive(Serialize)]
struct SuccessBody<'a> {
    #[serde(flatten)]
    report: &'a LocationReport,
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl ErrorBody {
    fn new(message: String) -> ErrorBody {
        ErrorBody {
            status: "error",
            message,
        }
    }
}

async fn handle_request<S, C>(
    endpoints: Arc<Endpoints<S, C>>,
    remote_address: SocketAddr,
    req: Request<Body>,
) -> Response<Body>
where
    S: AttendanceStore + 'static,
    C: Clock + 'static,
{
    log::debug!("{} {} from {}", req.method(), req.uri(), remote_address);

    if req.method() != Method::GET {
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &ErrorBody::new(format!("method {} is not allowed", req.method())),
        );
    }

    let user_id = remote_address.ip().to_string();

    match Route::parse(req.uri().path()) {
        Route::CheckLocation {
            latitude,
            longitude,
        } => {
            let result = run_blocking(endpoints, move |service| {
                service.check_location(&user_id, &latitude, &longitude)
            })
            .await;
            match result {
                Ok(report) => json_response(
                    StatusCode::OK,
                    &SuccessBody {
                        report: &report,
                        status: "success",
                    },
                ),
                Err(error) => error_response(error),
            }
        }
        Route::AttendanceStatus => {
            let result =
                run_blocking(endpoints, move |service| service.attendance_status(&user_id)).await;
            match result {
                Ok(status) => json_response(StatusCode::OK, &status),
                Err(error) => error_response(error),
            }
        }
        Route::AttendanceData => {
            let result = run_blocking(endpoints, |service| service.attendance_data()).await;
            match result {
                Ok(records) => json_response(StatusCode::OK, &records),
                Err(error) => error_response(error),
            }
        }
        Route::Asset(path) => match endpoints.assets.get(&path) {
            Some(asset) => {
                let mut response = Response::new(Body::from(asset.body));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(asset.content_type));
                response
            }
            None => not_found(&path),
        },
    }
}

/// Store access blocks, so it runs on tokio's blocking pool.
async fn run_blocking<S, C, T, F>(
    endpoints: Arc<Endpoints<S, C>>,
    call: F,
) -> Result<T, AttendanceError>
where
    S: AttendanceStore + 'static,
    C: Clock + 'static,
    T: Send + 'static,
    F: FnOnce(&AttendanceService<S, C>) -> Result<T, AttendanceError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(&endpoints.service))
        .await
        .map_err(|error| AttendanceError::Task(error.to_string()))?
}

// Validation errors keep HTTP 200 because the client page only looks at the JSON status field.
fn error_response(error: AttendanceError) -> Response<Body> {
    let status = if error.is_validation() {
        log::debug!("Rejected request: {}", error);
        StatusCode::OK
    } else {
        log::error!("Request failed: {}", error);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    json_response(status, &ErrorBody::new(error.to_string()))
}

fn not_found(path: &str) -> Response<Body> {
    json_response(
        StatusCode::NOT_FOUND,
        &ErrorBody::new(format!("no route for {}", path)),
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let (status, encoded) = match serde_json::to_vec(body) {
        Ok(encoded) => (status, encoded),
        Err(error) => {
            log::error!("Could not encode response: {}", error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"status":"error","message":"could not encode response"}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(Body::from(encoded));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
}
