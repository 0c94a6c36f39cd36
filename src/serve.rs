//! HTTP server for the school administration API
//!
//! `tatib serve` exposes a JSON API over the violation taxonomy, ledger and
//! queries.
//! Every response is an `{ok, data, error}` envelope; list endpoints carry
//! `{items, meta}` in `data`.

use crate::config::Config;
use crate::db::{Database, DbError};
use crate::ledger::ViolationUpdate;
use crate::query::{Page, PageMeta, SearchFilter};
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server};

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn failure(error: String) -> ApiResponse<()> {
        ApiResponse {
            ok: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Start the admin API server
pub fn start_server(port: u16) -> std::io::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let server = Server::http(&addr)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let db = Database::open()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let config = Config::load();

    eprintln!("\n\x1b[1;32mtatib\x1b[0m");
    eprintln!("   Admin API: http://localhost:{}", port);
    eprintln!("   Database:  {}", Database::db_path().display());
    eprintln!("   Press Ctrl+C to stop\n");

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(&db, &config, request) {
            eprintln!("Error: {}", e);
        }
    }

    Ok(())
}

fn handle_request(db: &Database, config: &Config, mut request: Request) -> std::io::Result<()> {
    let url = request.url().to_string();
    let (path, query) = match url.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (url.clone(), String::new()),
    };
    let method = request.method().clone();

    // Read body up front for the mutating methods
    let mut body = String::new();
    if matches!(method, Method::Post | Method::Put) {
        if let Err(e) = request.as_reader().read_to_string(&mut body) {
            let (json, status) = fail(400, &format!("Failed to read body: {}", e));
            return respond(request, json, status);
        }
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let (json, status) = route(db, config, &method, &segments, &query, &body);
    respond(request, json, status)
}

fn respond(request: Request, json: String, status: u16) -> std::io::Result<()> {
    let response = Response::from_string(json)
        .with_status_code(status)
        .with_header(Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap());
    request.respond(response)
}

fn route(
    db: &Database,
    config: &Config,
    method: &Method,
    segments: &[&str],
    query: &str,
    body: &str,
) -> (String, u16) {
    match (method, segments) {
        (&Method::Get, ["api", "health"]) => ok("OK"),

        // Taxonomy: categories
        (&Method::Get, ["violation-categories"]) => match db.list_categories() {
            Ok(items) => ok_list(items),
            Err(e) => db_fail(e),
        },
        (&Method::Post, ["violation-categories"]) => {
            let parsed: CreateCategoryBody = match serde_json::from_str(body) {
                Ok(b) => b,
                Err(e) => return fail(400, &format!("Invalid JSON: {}", e)),
            };
            match db
                .create_category(&parsed.name, parsed.description.as_deref())
                .and_then(|id| db.get_category(id))
            {
                Ok(category) => ok(category),
                Err(e) => db_fail(e),
            }
        }
        (&Method::Put, ["violation-categories", id]) => {
            let id = match parse_id(id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            let parsed: UpdateCategoryBody = match serde_json::from_str(body) {
                Ok(b) => b,
                Err(e) => return fail(400, &format!("Invalid JSON: {}", e)),
            };
            match db.update_category(id, parsed.name.as_deref(), parsed.description.as_deref()) {
                Ok(category) => ok(category),
                Err(e) => db_fail(e),
            }
        }
        (&Method::Delete, ["violation-categories", id]) => {
            let id = match parse_id(id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            match db.delete_category(id) {
                Ok(summary) => ok(summary),
                Err(e) => db_fail(e),
            }
        }

        // Taxonomy: types
        (&Method::Get, ["violation-types"]) => {
            let filter: TypeListQuery = serde_urlencoded::from_str(query).unwrap_or_default();
            match db.list_types(filter.category_id) {
                Ok(items) => ok_list(items),
                Err(e) => db_fail(e),
            }
        }
        (&Method::Post, ["violation-types"]) => {
            let parsed: CreateTypeBody = match serde_json::from_str(body) {
                Ok(b) => b,
                Err(e) => return fail(400, &format!("Invalid JSON: {}", e)),
            };
            match db
                .create_type(
                    parsed.category_id,
                    &parsed.name,
                    parsed.description.as_deref(),
                    parsed.default_points.unwrap_or(0),
                )
                .and_then(|id| db.get_type(id))
            {
                Ok(vtype) => ok(vtype),
                Err(e) => db_fail(e),
            }
        }
        (&Method::Put, ["violation-types", id]) => {
            let id = match parse_id(id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            let parsed: UpdateTypeBody = match serde_json::from_str(body) {
                Ok(b) => b,
                Err(e) => return fail(400, &format!("Invalid JSON: {}", e)),
            };
            match db.update_type(
                id,
                parsed.name.as_deref(),
                parsed.description.as_deref(),
                parsed.default_points,
            ) {
                Ok(vtype) => ok(vtype),
                Err(e) => db_fail(e),
            }
        }
        (&Method::Delete, ["violation-types", id]) => {
            let id = match parse_id(id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            match db.delete_type(id) {
                Ok(summary) => ok(summary),
                Err(e) => db_fail(e),
            }
        }

        // Ledger
        (&Method::Post, ["violations"]) => {
            let parsed: CreateViolationBody = match serde_json::from_str(body) {
                Ok(b) => b,
                Err(e) => return fail(400, &format!("Invalid JSON: {}", e)),
            };
            match db.record_violation(
                parsed.student_id,
                parsed.violation_type_id,
                &parsed.violation_date,
                parsed.points,
                parsed.action_taken.as_deref(),
                parsed.notes.as_deref(),
            ) {
                Ok(violation) => ok(violation),
                Err(e) => db_fail(e),
            }
        }
        (&Method::Put, ["violations", id]) => {
            let id = match parse_id(id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            let parsed: ViolationUpdate = match serde_json::from_str(body) {
                Ok(b) => b,
                Err(e) => return fail(400, &format!("Invalid JSON: {}", e)),
            };
            match db.amend_violation(id, parsed) {
                Ok(violation) => ok(violation),
                Err(e) => db_fail(e),
            }
        }
        (&Method::Delete, ["violations", id]) => {
            let id = match parse_id(id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            match db.expunge_violation(id) {
                Ok(()) => ok(true),
                Err(e) => db_fail(e),
            }
        }
        (&Method::Get, ["violations"]) => {
            let params: ViolationListQuery = serde_urlencoded::from_str(query).unwrap_or_default();
            let filter = SearchFilter {
                q: params.q,
                from: params.from,
                to: params.to,
            };
            let page = params.page.unwrap_or(1);
            let limit = params.limit.unwrap_or_else(|| config.page_size());
            match db.search_violations(&filter, page, limit) {
                Ok(page) => ok(page),
                Err(e) => db_fail(e),
            }
        }

        // Aggregates
        (&Method::Get, ["students", id, "violation-points"]) => {
            let id = match parse_id(id) {
                Ok(id) => id,
                Err(resp) => return resp,
            };
            match db.points_for_student(id) {
                Ok(total) => ok(PointsResponse {
                    student_id: id,
                    total,
                }),
                Err(e) => db_fail(e),
            }
        }
        (&Method::Get, ["students"]) => match db.list_students() {
            Ok(items) => ok_list(items),
            Err(e) => db_fail(e),
        },

        // 404
        _ => fail(404, "Not found"),
    }
}

// ============================================================================
// Request/response bodies
// ============================================================================

#[derive(serde::Deserialize)]
struct CreateCategoryBody {
    name: String,
    description: Option<String>,
}

#[derive(serde::Deserialize)]
struct UpdateCategoryBody {
    name: Option<String>,
    description: Option<String>,
}

#[derive(serde::Deserialize, Default)]
struct TypeListQuery {
    category_id: Option<i32>,
}

#[derive(serde::Deserialize)]
struct CreateTypeBody {
    category_id: i32,
    name: String,
    description: Option<String>,
    default_points: Option<i32>,
}

#[derive(serde::Deserialize)]
struct UpdateTypeBody {
    name: Option<String>,
    description: Option<String>,
    default_points: Option<i32>,
}

#[derive(serde::Deserialize)]
struct CreateViolationBody {
    student_id: i32,
    violation_type_id: i32,
    violation_date: String,
    points: Option<i32>,
    action_taken: Option<String>,
    notes: Option<String>,
}

#[derive(serde::Deserialize, Default)]
struct ViolationListQuery {
    page: Option<i64>,
    limit: Option<i64>,
    q: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

#[derive(Serialize)]
struct PointsResponse {
    student_id: i32,
    total: i32,
}

// ============================================================================
// Response helpers
// ============================================================================

fn ok<T: Serialize>(data: T) -> (String, u16) {
    let json = serde_json::to_string(&ApiResponse::success(data))
        .unwrap_or_else(|_| r#"{"ok":false,"data":null,"error":"serialization failed"}"#.into());
    (json, 200)
}

/// Wrap an unpaginated listing in the `{items, meta}` shape
fn ok_list<T: Serialize>(items: Vec<T>) -> (String, u16) {
    let total = items.len() as i64;
    let page = Page {
        items,
        meta: PageMeta {
            total_items: total,
            total_pages: if total == 0 { 0 } else { 1 },
            current_page: 1,
            page_size: total.max(1),
        },
    };
    ok(page)
}

fn fail(status: u16, message: &str) -> (String, u16) {
    let json = serde_json::to_string(&ApiResponse::<()>::failure(message.to_string()))
        .unwrap_or_else(|_| r#"{"ok":false,"data":null,"error":"serialization failed"}"#.into());
    (json, status)
}

fn db_fail(err: DbError) -> (String, u16) {
    match err {
        DbError::Validation(msg) => fail(400, &msg),
        DbError::NotFound(msg) => fail(404, &msg),
        DbError::Conflict(msg) => fail(409, &msg),
        other => {
            // Infrastructure failures roll back in full; the caller gets a
            // generic retry signal rather than internals.
            eprintln!("Error: {}", other);
            fail(500, "Internal error, please retry")
        }
    }
}

fn parse_id(raw: &str) -> std::result::Result<i32, (String, u16)> {
    raw.parse::<i32>()
        .map_err(|_| fail(400, &format!("Invalid id '{}'", raw)))
}
