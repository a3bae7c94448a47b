//! Loan routes against the full router

mod common;

use axum::http::{Method, StatusCode};
use common::spawn_app;
use regex::Regex;
use serde_json::{json, Value};

const BORROWER_ID: &str = "5f8d0c1e-3b4a-4c2d-9e8f-0a1b2c3d4e5f";

fn loan_body(amount: f64, industry: Option<&str>) -> Value {
    let mut body = json!({
        "borrower_id": BORROWER_ID,
        "loan_type": "term",
        "amount": amount,
        "interest_rate": 0.05,
        "term_months": 36,
        "purpose": "Working capital for regional expansion",
    });
    if let Some(industry) = industry {
        body["industry"] = json!(industry);
    }
    body
}

async fn create_loan(app: &common::TestApp, token: &str, body: Value) -> Value {
    let (status, resp) = app
        .request(Method::POST, "/api/v1/loans", Some(token), Some(body))
        .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {resp}");
    resp["loan"].clone()
}

#[tokio::test]
async fn create_loan_starts_as_draft() {
    let app = spawn_app();
    let (_, token, _) = app.login_as("b@x.com", "borrower").await;

    let loan = create_loan(&app, &token, loan_body(500_000.0, None)).await;
    assert_eq!(loan["status"], "draft");
    assert_eq!(loan["currency"], "USD");
    assert_eq!(loan["payment_frequency"], "monthly");

    let pattern = Regex::new(r"^LN-[0-9A-Z]+-[0-9A-Z]{5}$").unwrap();
    assert!(pattern.is_match(loan["loan_number"].as_str().unwrap()));

    let path = format!("/api/v1/loans/{}", loan["id"].as_str().unwrap());
    let (status, body) = app.request(Method::GET, &path, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loan"]["loan_number"], loan["loan_number"]);
}

#[tokio::test]
async fn loan_routes_require_authentication() {
    let app = spawn_app();
    let (status, body) = app.request(Method::GET, "/api/v1/loans", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "No token provided");
}

#[tokio::test]
async fn create_loan_validation() {
    let app = spawn_app();
    let (_, token, _) = app.login_as("b@x.com", "borrower").await;

    let mut bad_rate = loan_body(500_000.0, None);
    bad_rate["interest_rate"] = json!(5);
    let (status, _) = app
        .request(Method::POST, "/api/v1/loans", Some(&token), Some(bad_rate))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut bad_type = loan_body(500_000.0, None);
    bad_type["loan_type"] = json!("mortgage");
    let (status, _) = app
        .request(Method::POST, "/api/v1/loans", Some(&token), Some(bad_type))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn esg_score_for_high_impact_industry() {
    let app = spawn_app();
    let (_, token, _) = app.login_as("b@x.com", "borrower").await;
    let loan = create_loan(&app, &token, loan_body(2_000_000.0, Some("oil_gas"))).await;
    let id = loan["id"].as_str().unwrap();

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/loans/{id}/esg-score"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["esg_score"], json!(3.0));

    let (_, body) = app
        .request(Method::GET, &format!("/api/v1/loans/{id}"), Some(&token), None)
        .await;
    assert_eq!(body["loan"]["esg_score"], json!(3.0));
}

#[tokio::test]
async fn risk_assessment_ratings() {
    let app = spawn_app();
    let (_, token, _) = app.login_as("b@x.com", "borrower").await;

    let small = create_loan(&app, &token, loan_body(500_000.0, None)).await;
    let large = create_loan(&app, &token, loan_body(6_000_000.0, None)).await;

    let assess = |id: String, score: u16| {
        let app = &app;
        let token = token.clone();
        async move {
            app.request(
                Method::POST,
                &format!("/api/v1/loans/{id}/risk-assessment"),
                Some(&token),
                Some(json!({ "credit_score": score })),
            )
            .await
        }
    };

    let (status, body) = assess(small["id"].as_str().unwrap().to_string(), 620).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk_rating"], "BB");

    let (status, body) = assess(large["id"].as_str().unwrap().to_string(), 520).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk_rating"], "CC");

    let (status, _) = assess(small["id"].as_str().unwrap().to_string(), 900).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_changes_are_limited_to_lenders_and_admins() {
    let app = spawn_app();
    let (_, borrower, _) = app.login_as("b@x.com", "borrower").await;
    let (_, lender, _) = app.login_as("l@x.com", "lender").await;
    let loan = create_loan(&app, &borrower, loan_body(500_000.0, None)).await;
    let path = format!("/api/v1/loans/{}/status", loan["id"].as_str().unwrap());

    let (status, _) = app
        .request(
            Method::PATCH,
            &path,
            Some(&borrower),
            Some(json!({ "status": "approved" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(
            Method::PATCH,
            &path,
            Some(&lender),
            Some(json!({ "status": "approved" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loan"]["status"], "approved");

    let (status, _) = app
        .request(
            Method::PATCH,
            &path,
            Some(&lender),
            Some(json!({ "status": "closed" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_uses_the_allow_list() {
    let app = spawn_app();
    let (_, token, _) = app.login_as("b@x.com", "borrower").await;
    let loan = create_loan(&app, &token, loan_body(500_000.0, None)).await;
    let path = format!("/api/v1/loans/{}", loan["id"].as_str().unwrap());

    // Warm the snapshot so the update has something to invalidate
    app.request(Method::GET, &path, Some(&token), None).await;

    let (status, body) = app
        .request(Method::PUT, &path, Some(&token), Some(json!({ "amount": 750000 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loan"]["amount"], json!(750000.0));

    let (_, body) = app.request(Method::GET, &path, Some(&token), None).await;
    assert_eq!(body["loan"]["amount"], json!(750000.0));

    let (status, _) = app
        .request(Method::PUT, &path, Some(&token), Some(json!({ "status": "active" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(Method::PUT, &path, Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No valid fields to update");
}

#[tokio::test]
async fn list_filters_and_statistics() {
    let app = spawn_app();
    let (_, token, _) = app.login_as("b@x.com", "borrower").await;
    create_loan(&app, &token, loan_body(100_000.0, Some("mining"))).await;
    create_loan(&app, &token, loan_body(900_000.0, Some("clean_tech"))).await;
    create_loan(&app, &token, loan_body(6_000_000.0, None)).await;

    let (status, body) = app
        .request(
            Method::GET,
            "/api/v1/loans?min_amount=500000&industry=clean_tech",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = app
        .request(Method::GET, "/api/v1/loans/statistics", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["statistics"]["total_loans"], 3);
    assert_eq!(body["statistics"]["active_loans"], 0);
}

#[tokio::test]
async fn only_admins_delete_loans() {
    let app = spawn_app();
    let (_, borrower, _) = app.login_as("b@x.com", "borrower").await;
    let (_, admin, _) = app.login_as("admin@x.com", "admin").await;
    let loan = create_loan(&app, &borrower, loan_body(500_000.0, None)).await;
    let path = format!("/api/v1/loans/{}", loan["id"].as_str().unwrap());

    let (status, _) = app.request(Method::DELETE, &path, Some(&borrower), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.request(Method::DELETE, &path, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.request(Method::GET, &path, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Loan not found");
}
