use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message as WsFrame;
use tower::ServiceExt;
use tutordesk_core::{OrderType, Sender};
use uuid::Uuid;

use crate::api;
use crate::chat::SendMessage;
use crate::test_support::TestApp;

const BOUNDARY: &str = "tutordesk-test-boundary";

fn app_router(app: &TestApp) -> Router {
    api::router(app.state.clone())
}

async fn call(router: Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = router.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        field: &'a str,
        filename: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

fn post_multipart(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                field,
                filename,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Decimals are serialized as strings.
fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

fn id(value: &Value) -> Uuid {
    value.as_str().unwrap().parse().unwrap()
}

fn order_body(user: Uuid, order_type: &str, total_cost: Decimal) -> Value {
    json!({
        "userId": user,
        "orderType": order_type,
        "subject": "Biology",
        "description": "Lab report on enzyme activity",
        "deadline": (Utc::now() + chrono::Duration::days(3)).to_rfc3339(),
        "pages": 2,
        "pricePerPage": (total_cost / Decimal::from(2)).to_string(),
        "totalCost": total_cost.to_string(),
    })
}

// ─────────────────────────────────────────────────────────
// Basics
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, body) = call(app_router(&app), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_create_and_fetch_user() {
    let app = TestApp::new().await;

    let (status, body) = call(
        app_router(&app),
        post_json("/users", json!({"name": "Ada", "email": "Ada@Example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["role"], "student");
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(money(&body["user"]["balance"]), Decimal::ZERO);
    let user_id = id(&body["user"]["id"]);

    let (status, body) = call(
        app_router(&app),
        post_json("/users", json!({"name": "Ada again", "email": "ada@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");

    let (status, body) = call(app_router(&app), get(&format!("/users/{user_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "Ada");

    let (status, body) = call(
        app_router(&app),
        get(&format!("/users/{}", Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_malformed_json_uses_error_envelope() {
    let app = TestApp::new().await;
    let req = Request::builder()
        .method(Method::POST)
        .uri("/payments/instant")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = call(app_router(&app), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "invalid_input");
}

// ─────────────────────────────────────────────────────────
// Orders and payments
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_order_gated_until_instant_credit() {
    let app = TestApp::new().await;
    let student = app.student(dec!(0)).await;
    let tutor = app.tutor().await;

    let (status, body) = call(
        app_router(&app),
        post_json("/orders", order_body(student.id, "lab-report", dec!(50))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order"]["status"], "checking-balance");
    assert_eq!(body["order"]["category"], "writing");
    let order_id = id(&body["order"]["id"]);

    let (status, body) = call(
        app_router(&app),
        post_json(
            "/tutor/accept-assignment",
            json!({"assignmentId": order_id, "tutorId": tutor.id}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "insufficient_balance");
    assert_eq!(money(&body["balance"]), dec!(0));
    assert_eq!(money(&body["required"]), dec!(50));

    let (status, body) = call(
        app_router(&app),
        get(&format!("/users/{}/balance-check", student.id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["needsTopUp"], true);
    assert_eq!(body["checkingBalanceOrders"], 1);
    assert_eq!(money(&body["totalRequired"]), dec!(50));

    let (status, body) = call(
        app_router(&app),
        post_json(
            "/payments/instant",
            json!({"userId": student.id, "amount": "60", "method": "paystack"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&body["balance"]), dec!(60));
    assert_eq!(body["transaction"]["status"], "completed");
    assert_eq!(body["advanced"], json!([order_id]));

    let (status, body) = call(app_router(&app), get(&format!("/orders/{order_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "assigned");

    let (_, body) = call(
        app_router(&app),
        post_json(
            "/tutor/accept-assignment",
            json!({"assignmentId": order_id, "tutorId": tutor.id}),
        ),
    )
    .await;
    assert_eq!(body["assignment"]["assignedTutor"], json!(tutor.id));

    let (_, body) = call(
        app_router(&app),
        get(&format!("/users/{}/orders", student.id)),
    )
    .await;
    assert_eq!(body["count"], 1);

    let (_, body) = call(
        app_router(&app),
        get(&format!("/users/{}/payments", student.id)),
    )
    .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["payments"][0]["method"], "paystack");
}

#[tokio::test]
async fn test_instant_route_rejects_proof_methods() {
    let app = TestApp::new().await;
    let student = app.student(dec!(0)).await;

    let (status, body) = call(
        app_router(&app),
        post_json(
            "/payments/instant",
            json!({"userId": student.id, "amount": 10, "method": "bitcoin"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
    assert_eq!(app.balance(student.id).await, dec!(0));
}

#[tokio::test]
async fn test_invalid_status_update_is_conflict() {
    let app = TestApp::new().await;
    let student = app.student(dec!(0)).await;
    let order = app.order(student.id, OrderType::Essay, dec!(10)).await;

    let (status, body) = call(
        app_router(&app),
        post_json(
            "/tutor/update-assignment-status",
            json!({"assignmentId": order.id, "status": "completed"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_transition");

    let (status, body) = call(
        app_router(&app),
        post_json(
            "/tutor/update-assignment-status",
            json!({"assignmentId": order.id, "status": "cancelled", "comments": "student withdrew"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assignment"]["status"], "cancelled");
    assert_eq!(body["assignment"]["tutorComments"], "student withdrew");
}

#[tokio::test]
async fn test_proof_upload_review_and_download() {
    let app = TestApp::new().await;
    let student = app.student(dec!(0)).await;
    let approver = app.tutor().await;
    let user_id = student.id.to_string();
    let receipt: &[u8] = b"\x89PNG fake receipt bytes";

    let (status, body) = call(
        app_router(&app),
        post_multipart(
            "/payments/proof",
            &[
                Part::Text("userId", &user_id),
                Part::Text("amount", "25.50"),
                Part::Text("method", "cashapp"),
                Part::File {
                    field: "proof",
                    filename: "receipt.png",
                    content_type: "image/png",
                    bytes: receipt,
                },
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["transaction"]["status"], "pending");
    assert_eq!(body["transaction"]["proofFilename"], "receipt.png");
    let tx_id = id(&body["transaction"]["id"]);
    let blob_id = body["transaction"]["proofBlobId"].as_str().unwrap().to_string();

    let res = app_router(&app)
        .oneshot(get(&format!("/file/{blob_id}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        res.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"receipt.png\""
    );
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], receipt);

    let (_, body) = call(app_router(&app), get("/tutor/pending-payments")).await;
    assert_eq!(body["count"], 1);
    assert_eq!(id(&body["payments"][0]["id"]), tx_id);

    let (status, body) = call(
        app_router(&app),
        post_json(
            "/tutor/approve-transaction",
            json!({"transactionId": tx_id, "approverId": approver.id}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&body["newBalance"]), dec!(25.50));
    assert_eq!(body["transaction"]["status"], "approved");

    let (status, body) = call(
        app_router(&app),
        post_json(
            "/tutor/reject-transaction",
            json!({"transactionId": tx_id, "approverId": approver.id, "reason": "too late"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "already_resolved");

    let (status, body) = call(app_router(&app), get("/file/0000")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_proof_without_file_is_invalid() {
    let app = TestApp::new().await;
    let student = app.student(dec!(0)).await;
    let user_id = student.id.to_string();

    let (status, body) = call(
        app_router(&app),
        post_multipart(
            "/payments/proof",
            &[
                Part::Text("userId", &user_id),
                Part::Text("amount", "10"),
                Part::Text("method", "bitcoin"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn test_withdraw_and_refund_requests() {
    let app = TestApp::new().await;
    let student = app.student(dec!(40)).await;
    let order = app.order(student.id, OrderType::Essay, dec!(100)).await;

    let (status, body) = call(
        app_router(&app),
        post_json(
            "/payments/request-withdraw",
            json!({"userId": student.id, "amount": "50", "method": "paypal"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(money(&body["balance"]), dec!(40));
    assert_eq!(money(&body["required"]), dec!(50));

    let (status, body) = call(
        app_router(&app),
        post_json(
            "/payments/request-withdraw",
            json!({"userId": student.id, "amount": "40", "method": "paypal", "destination": "me@example.com"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["transaction"]["status"], "withdraw-requested");
    assert_eq!(body["transaction"]["reference"], "me@example.com");

    let (status, body) = call(
        app_router(&app),
        post_json(
            "/payments/request-refund",
            json!({"userId": student.id, "assignmentId": order.id, "amount": "100"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["transaction"]["status"], "refund-requested");
    assert_eq!(body["transaction"]["reference"], "Refund request");
    assert_eq!(app.state.ledger.pending().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_upload_completed_files_completes_and_charges() {
    let app = TestApp::new().await;
    let student = app.student(dec!(80)).await;
    let tutor = app.tutor().await;
    let order = app.order(student.id, OrderType::Essay, dec!(50)).await;
    app.state.lifecycle.assign(order.id, Some(tutor.id)).await.unwrap();
    let tutor_id = tutor.id.to_string();
    let uri = format!("/tutor/upload-completed-files/{}", order.id);

    let (status, body) = call(
        app_router(&app),
        post_multipart(
            &uri,
            &[
                Part::Text("tutorId", &tutor_id),
                Part::Text("comments", "final draft attached"),
                Part::File {
                    field: "files",
                    filename: "essay.docx",
                    content_type: "application/octet-stream",
                    bytes: b"essay body",
                },
                Part::File {
                    field: "files",
                    filename: "sources.pdf",
                    content_type: "application/pdf",
                    bytes: b"sources",
                },
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filesUploaded"], 2);
    assert_eq!(body["assignment"]["status"], "completed");
    assert_eq!(body["assignment"]["tutorComments"], "final draft attached");
    assert_eq!(body["assignment"]["completedFiles"].as_array().unwrap().len(), 2);
    assert_eq!(money(&body["charge"]["amount"]), dec!(-50));
    assert_eq!(body["charge"]["method"], "assignment-charge");
    assert_eq!(money(&body["balance"]), dec!(30));

    let (status, body) = call(
        app_router(&app),
        post_multipart(
            &uri,
            &[Part::File {
                field: "files",
                filename: "again.docx",
                content_type: "application/octet-stream",
                bytes: b"again",
            }],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_transition");
    assert_eq!(app.charge_count(order.id).await, 1);

    let (status, body) = call(app_router(&app), post_multipart(&uri, &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn test_missing_blob_store_is_service_unavailable() {
    let app = TestApp::without_blobs().await;
    let student = app.student(dec!(0)).await;
    let user_id = student.id.to_string();

    let (status, body) = call(app_router(&app), get("/file/anything")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "storage_unavailable");

    let (status, body) = call(
        app_router(&app),
        post_multipart(
            "/payments/proof",
            &[
                Part::Text("userId", &user_id),
                Part::Text("amount", "10"),
                Part::Text("method", "bitcoin"),
                Part::File {
                    field: "proof",
                    filename: "r.png",
                    content_type: "image/png",
                    bytes: b"r",
                },
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "storage_unavailable");
}

#[tokio::test]
async fn test_multipart_order_carries_brief_files() {
    let app = TestApp::new().await;
    let student = app.student(dec!(0)).await;
    let user_id = student.id.to_string();
    let deadline = (Utc::now() + chrono::Duration::days(2)).to_rfc3339();

    let (status, body) = call(
        app_router(&app),
        post_multipart(
            "/orders",
            &[
                Part::Text("userId", &user_id),
                Part::Text("orderType", "lab-report"),
                Part::Text("subject", "Biology"),
                Part::Text("description", "Enzyme kinetics write-up"),
                Part::Text("deadline", &deadline),
                Part::Text("pages", "3"),
                Part::Text("totalCost", "45"),
                Part::File {
                    field: "files",
                    filename: "rubric.pdf",
                    content_type: "application/pdf",
                    bytes: b"grading rubric",
                },
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order"]["status"], "checking-balance");
    assert_eq!(body["order"]["title"], "lab-report - Biology");
    assert_eq!(money(&body["order"]["totalCost"]), dec!(45));
    assert_eq!(body["order"]["files"][0]["kind"], "brief");
    assert_eq!(body["order"]["files"][0]["filename"], "rubric.pdf");

    let blob_id = body["order"]["files"][0]["blobId"].as_str().unwrap().to_string();
    let res = app_router(&app)
        .oneshot(get(&format!("/file/{blob_id}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, body) = call(
        app_router(&app),
        post_multipart(
            "/orders",
            &[
                Part::Text("userId", &user_id),
                Part::Text("subject", "Biology"),
                Part::Text("description", "No order type"),
                Part::Text("deadline", &deadline),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn test_tutor_work_queue() {
    let app = TestApp::new().await;
    let ada = app.student(dec!(0)).await;
    let ben = app.student(dec!(0)).await;
    let older = app.order(ada.id, OrderType::Essay, dec!(20)).await;
    let newer = app.order(ben.id, OrderType::MathProblems, dec!(30)).await;

    let (status, body) = call(app_router(&app), get("/tutor/assignments")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(id(&body["assignments"][0]["id"]), newer.id);
    assert_eq!(body["assignments"][0]["ownerName"], ben.name.as_str());
    assert_eq!(body["assignments"][1]["ownerEmail"], ada.email.as_str());
    assert_eq!(id(&body["assignments"][1]["id"]), older.id);

    let (status, body) = call(
        app_router(&app),
        get("/tutor/assignments?status=checking-balance"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(id(&body["assignments"][0]["id"]), older.id);

    let (status, body) = call(app_router(&app), get("/tutor/assignments?status=done")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

// ─────────────────────────────────────────────────────────
// Chat over HTTP
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_message_routes() {
    let app = TestApp::new().await;
    let owner = app.student(dec!(0)).await;
    let intruder = app.student(dec!(0)).await;
    let order = app.order(owner.id, OrderType::Essay, dec!(10)).await;

    let (status, body) = call(
        app_router(&app),
        post_json(
            "/messages",
            json!({"assignmentId": order.id, "sender": "student", "studentId": intruder.id, "content": "hi"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");

    let (status, body) = call(
        app_router(&app),
        post_json(
            "/messages",
            json!({"assignmentId": order.id, "sender": "student", "studentId": owner.id, "content": " hello "}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"]["content"], " hello ");
    assert_eq!(body["message"]["tutorId"], Value::Null);

    let (status, body) = call(
        app_router(&app),
        get(&format!("/messages?assignmentId={}", order.id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["messages"][0]["sender"], "student");
}

/// Read SSE chunks until a full `message` event has arrived.
async fn next_sse_event(stream: &mut axum::body::BodyDataStream) -> String {
    let mut buf = String::new();
    loop {
        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for an SSE event")
            .expect("stream ended")
            .unwrap();
        buf.push_str(&String::from_utf8_lossy(&chunk));
        if buf.contains("event:") && buf.contains("data:") && buf.ends_with("\n\n") {
            return buf;
        }
    }
}

#[tokio::test]
async fn test_sse_stream_delivers_and_unsubscribes_on_drop() {
    let app = TestApp::new().await;
    let student = app.student(dec!(0)).await;
    let order = app.order(student.id, OrderType::Essay, dec!(10)).await;

    let res = app_router(&app)
        .oneshot(get(&format!(
            "/messages/stream?assignmentId={}&clientId=web-1",
            order.id
        )))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(app.state.chat.registry().subscriber_count(order.id), 1);

    let mut events = res.into_body().into_data_stream();
    let sent = app
        .state
        .chat
        .send(SendMessage {
            assignment_id: order.id,
            sender: Sender::Student,
            student_id: Some(student.id),
            tutor_id: None,
            content: "over sse".into(),
        })
        .await
        .unwrap();

    let event = next_sse_event(&mut events).await;
    assert!(event.contains(&sent.id.to_string()));
    let data = event
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .unwrap();
    let payload: Value = serde_json::from_str(data).unwrap();
    assert_eq!(payload["type"], "message");
    assert_eq!(payload["message"]["content"], "over sse");

    drop(events);
    assert_eq!(app.state.chat.registry().subscriber_count(order.id), 0);
}

#[tokio::test]
async fn test_sse_unknown_assignment_is_not_found() {
    let app = TestApp::new().await;
    let (status, body) = call(
        app_router(&app),
        get(&format!("/messages/stream?assignmentId={}", Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

// ─────────────────────────────────────────────────────────
// WebSocket rooms
// ─────────────────────────────────────────────────────────

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn serve(app: &TestApp) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app_router(app);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        match ws.next().await.expect("socket closed").unwrap() {
            WsFrame::Text(text) => return serde_json::from_str(&text).unwrap(),
            WsFrame::Ping(_) | WsFrame::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

async fn send_frame(ws: &mut Client, frame: Value) {
    ws.send(WsFrame::Text(frame.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_ws_join_receive_and_leave() {
    let app = TestApp::new().await;
    let student = app.student(dec!(0)).await;
    let order = app.order(student.id, OrderType::Essay, dec!(10)).await;
    let url = serve(&app).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    send_frame(
        &mut ws,
        json!({"type": "chat:join", "assignmentId": order.id, "clientId": "tab-1"}),
    )
    .await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "chat:joined");
    assert_eq!(id(&ack["assignmentId"]), order.id);
    assert_eq!(app.state.chat.registry().subscriber_count(order.id), 1);

    app.state
        .chat
        .send(SendMessage {
            assignment_id: order.id,
            sender: Sender::Student,
            student_id: Some(student.id),
            tutor_id: None,
            content: "over ws".into(),
        })
        .await
        .unwrap();
    let pushed = tokio::time::timeout(Duration::from_secs(2), next_json(&mut ws))
        .await
        .unwrap();
    assert_eq!(pushed["type"], "message");
    assert_eq!(pushed["message"]["content"], "over ws");

    send_frame(&mut ws, json!({"type": "chat:join", "assignmentId": Uuid::new_v4()})).await;
    let err = next_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["kind"], "not_found");

    send_frame(&mut ws, json!({"type": "nonsense"})).await;
    let err = next_json(&mut ws).await;
    assert_eq!(err["kind"], "invalid_input");

    send_frame(&mut ws, json!({"type": "chat:leave", "assignmentId": order.id})).await;
    let left = next_json(&mut ws).await;
    assert_eq!(left["type"], "chat:left");
    assert_eq!(app.state.chat.registry().subscriber_count(order.id), 0);
}

#[tokio::test]
async fn test_ws_skips_client_already_streaming() {
    let app = TestApp::new().await;
    let student = app.student(dec!(0)).await;
    let order = app.order(student.id, OrderType::Essay, dec!(10)).await;
    let url = serve(&app).await;

    let (_stream, mut inbox) = app
        .state
        .chat
        .subscribe_stream(order.id, Some("tab-1".into()))
        .await
        .unwrap();

    let (mut same, _) = tokio_tungstenite::connect_async(url.clone()).await.unwrap();
    let (mut other, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    send_frame(
        &mut same,
        json!({"type": "chat:join", "assignmentId": order.id, "clientId": "tab-1"}),
    )
    .await;
    send_frame(
        &mut other,
        json!({"type": "chat:join", "assignmentId": order.id, "clientId": "tab-2"}),
    )
    .await;
    assert_eq!(next_json(&mut same).await["type"], "chat:joined");
    assert_eq!(next_json(&mut other).await["type"], "chat:joined");

    app.state
        .chat
        .send(SendMessage {
            assignment_id: order.id,
            sender: Sender::Student,
            student_id: Some(student.id),
            tutor_id: None,
            content: "once".into(),
        })
        .await
        .unwrap();

    let streamed = tokio::time::timeout(Duration::from_secs(1), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(streamed.content, "once");
    let pushed = tokio::time::timeout(Duration::from_secs(2), next_json(&mut other))
        .await
        .unwrap();
    assert_eq!(pushed["message"]["content"], "once");
    let duplicate = tokio::time::timeout(Duration::from_millis(200), next_json(&mut same)).await;
    assert!(duplicate.is_err());
}

#[tokio::test]
async fn test_ws_join_without_client_id_only_acks() {
    let app = TestApp::new().await;
    let student = app.student(dec!(0)).await;
    let order = app.order(student.id, OrderType::Essay, dec!(10)).await;
    let url = serve(&app).await;

    let (_stream, mut inbox) = app.state.chat.subscribe_stream(order.id, None).await.unwrap();
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    send_frame(&mut ws, json!({"type": "chat:join", "assignmentId": order.id})).await;
    assert_eq!(next_json(&mut ws).await["type"], "chat:joined");

    app.state
        .chat
        .send(SendMessage {
            assignment_id: order.id,
            sender: Sender::Student,
            student_id: Some(student.id),
            tutor_id: None,
            content: "stream only".into(),
        })
        .await
        .unwrap();

    let streamed = tokio::time::timeout(Duration::from_secs(1), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(streamed.content, "stream only");
    let pushed = tokio::time::timeout(Duration::from_millis(200), next_json(&mut ws)).await;
    assert!(pushed.is_err());
}
