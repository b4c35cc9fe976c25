use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Method, Request, Response, StatusCode};

use crate::error::{into_response, DavError, HttpResponse};
use crate::resource::parse_path;
use crate::state::AppState;
use crate::{crud, middleware, propfind, report};

const MAX_BODY_BYTES: usize = 8 << 20;

pub async fn route(state: AppState, req: Request<Incoming>) -> Result<HttpResponse, std::convert::Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    tracing::debug!(%method, %path, "request");

    Ok(match dispatch(&state, method, &path, req).await {
        Ok(resp) => resp,
        Err(err) => into_response(err),
    })
}

async fn dispatch(
    state: &AppState,
    method: Method,
    path: &str,
    req: Request<Incoming>,
) -> Result<HttpResponse, DavError> {
    if method == Method::OPTIONS {
        return Ok(options_response());
    }
    if path == "/.well-known/caldav" || path == "/.well-known/carddav" {
        return Ok(well_known_redirect(&state.config.base_path));
    }

    let principal = middleware::authenticate(state, &req).await?;
    let depth = req
        .headers()
        .get("depth")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.parse::<dav_proto::types::Depth>())
        .transpose()
        .map_err(|_| DavError::Malformed("invalid Depth header".into()))?
        .unwrap_or_default();
    let headers = req.headers().clone();
    let resource = parse_path(&state.config.base_path, path)?;

    match method.as_str() {
        "PROPFIND" => {
            let body = read_body(req).await?;
            let xml = propfind::handle(state, &principal, &resource, depth, &body).await?;
            Ok(xml_response(StatusCode::MULTI_STATUS, xml))
        }
        "REPORT" => {
            let body = read_body(req).await?;
            let xml = report::handle(state, &principal, &resource, &body).await?;
            Ok(xml_response(StatusCode::MULTI_STATUS, xml))
        }
        "GET" | "HEAD" => crud::get(state, &principal, &resource, &headers).await,
        "PUT" => {
            let body = read_body(req).await?;
            crud::put(state, &principal, &resource, &headers, body).await
        }
        "DELETE" => crud::delete(state, &principal, &resource, &headers).await,
        "MKCALENDAR" => {
            let body = read_body(req).await?;
            crud::mkcalendar(state, &principal, &resource, &body).await
        }
        "MKCOL" => {
            let body = read_body(req).await?;
            crud::mkcol(state, &principal, &resource, &body).await
        }
        "PROPPATCH" => {
            let body = read_body(req).await?;
            crud::proppatch(state, &principal, &resource, &body).await
        }
        _ => Err(DavError::MethodNotAllowed),
    }
}

async fn read_body(req: Request<Incoming>) -> Result<Vec<u8>, DavError> {
    let collected = req
        .into_body()
        .collect()
        .await
        .map_err(|e| DavError::Malformed(e.to_string()))?;
    let bytes = collected.to_bytes();
    if bytes.len() > MAX_BODY_BYTES {
        return Err(DavError::PayloadTooLarge);
    }
    Ok(bytes.to_vec())
}

fn xml_response(status: StatusCode, body: Vec<u8>) -> HttpResponse {
    Response::builder()
        .status(status)
        .header("content-type", "application/xml; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn well_known_redirect(base_path: &str) -> HttpResponse {
    Response::builder()
        .status(StatusCode::PERMANENT_REDIRECT)
        .header("location", format!("{}/", base_path))
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn options_response() -> HttpResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header("DAV", "1, 3, access-control, calendar-access, addressbook")
        .header(
            "Allow",
            "OPTIONS, GET, HEAD, PUT, DELETE, PROPFIND, PROPPATCH, MKCOL, MKCALENDAR, REPORT",
        )
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
