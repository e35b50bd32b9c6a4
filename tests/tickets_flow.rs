mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{acquire_db_lock, body_to_vec, TestApp};
use diesel::prelude::*;
use helpdesk::policy::Role;
use serde_json::{json, Value};
use uuid::Uuid;

struct Helpdesk {
    user_token: String,
    agent_token: String,
    other_user_token: String,
    user_id: Uuid,
    company: Uuid,
    category: Uuid,
}

async fn seed(app: &TestApp) -> Result<Helpdesk> {
    let admin = app
        .insert_user("admin@example.com", "adminpass", &[(Role::User, None)])
        .await?;
    let company = app.insert_company("Acme", admin).await?;
    let category = app.insert_category(company, "Billing").await?;

    let user_id = app
        .insert_user("reporter@example.com", "userpass", &[(Role::User, None)])
        .await?;
    app.insert_user(
        "agent@example.com",
        "agentpass",
        &[(Role::User, None), (Role::Agent, Some(company))],
    )
    .await?;
    app.insert_user("bystander@example.com", "userpass", &[(Role::User, None)])
        .await?;

    app.follow_company(user_id, company).await?;

    Ok(Helpdesk {
        user_token: app.login_token("reporter@example.com", "userpass").await?,
        agent_token: app.login_token("agent@example.com", "agentpass").await?,
        other_user_token: app.login_token("bystander@example.com", "userpass").await?,
        user_id,
        company,
        category,
    })
}

async fn create_ticket(app: &TestApp, ctx: &Helpdesk, title: &str) -> Result<Value> {
    let response = app
        .post_json(
            "/api/tickets",
            &json!({
                "company_id": ctx.company,
                "category_id": ctx.category,
                "title": title,
                "description": "Something is broken.",
                "priority": "high"
            }),
            Some(&ctx.user_token),
        )
        .await?;
    let status = response.status();
    let bytes = body_to_vec(response.into_body()).await?;
    anyhow::ensure!(
        status == StatusCode::CREATED,
        "ticket create failed ({status}): {}",
        String::from_utf8_lossy(&bytes)
    );
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn creation_requires_an_active_follow() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let ctx = seed(&app).await?;

    // the bystander does not follow Acme
    let denied = app
        .post_json(
            "/api/tickets",
            &json!({
                "company_id": ctx.company,
                "category_id": ctx.category,
                "title": "No follow",
                "description": "Should be rejected."
            }),
            Some(&ctx.other_user_token),
        )
        .await?;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let ticket = create_ticket(&app, &ctx, "Printer on fire").await?;
    let code = ticket["ticket_code"].as_str().unwrap();
    assert!(code.starts_with(&format!("TKT-{}-", Utc::now().format("%Y"))));
    assert_eq!(ticket["status"], "open");
    assert_eq!(ticket["priority"], "high");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn users_only_see_their_own_tickets() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let ctx = seed(&app).await?;

    let ticket = create_ticket(&app, &ctx, "Private issue").await?;
    let code = ticket["ticket_code"].as_str().unwrap();

    let foreign = app
        .get(&format!("/api/tickets/{code}"), Some(&ctx.other_user_token))
        .await?;
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

    let agent_view = app
        .get(&format!("/api/tickets/{code}"), Some(&ctx.agent_token))
        .await?;
    assert_eq!(agent_view.status(), StatusCode::OK);

    let own_list = app.get("/api/tickets", Some(&ctx.user_token)).await?;
    let body: Value = serde_json::from_slice(&body_to_vec(own_list.into_body()).await?)?;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let foreign_list = app.get("/api/tickets", Some(&ctx.other_user_token)).await?;
    let body: Value = serde_json::from_slice(&body_to_vec(foreign_list.into_body()).await?)?;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn lifecycle_walks_open_pending_resolved_closed() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let ctx = seed(&app).await?;

    let ticket = create_ticket(&app, &ctx, "Lifecycle").await?;
    let code = ticket["ticket_code"].as_str().unwrap();

    // agent engagement moves the ticket to pending
    let respond = app
        .post_json(
            &format!("/api/tickets/{code}/responses"),
            &json!({ "body": "Looking into it." }),
            Some(&ctx.agent_token),
        )
        .await?;
    assert_eq!(respond.status(), StatusCode::CREATED);
    let after_response = app
        .get(&format!("/api/tickets/{code}"), Some(&ctx.agent_token))
        .await?;
    let body: Value = serde_json::from_slice(&body_to_vec(after_response.into_body()).await?)?;
    assert_eq!(body["status"], "pending");

    // only agents resolve; the reporter cannot
    let user_resolve = app
        .post_json(
            &format!("/api/tickets/{code}/resolve"),
            &json!({}),
            Some(&ctx.user_token),
        )
        .await?;
    assert_eq!(user_resolve.status(), StatusCode::FORBIDDEN);

    let resolve = app
        .post_json(
            &format!("/api/tickets/{code}/resolve"),
            &json!({}),
            Some(&ctx.agent_token),
        )
        .await?;
    assert_eq!(resolve.status(), StatusCode::OK);

    let resolve_again = app
        .post_json(
            &format!("/api/tickets/{code}/resolve"),
            &json!({}),
            Some(&ctx.agent_token),
        )
        .await?;
    assert_eq!(resolve_again.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body_to_vec(resolve_again.into_body()).await?)?;
    assert_eq!(body["message"], "Ticket is already resolved");

    let close = app
        .post_json(
            &format!("/api/tickets/{code}/close"),
            &json!({}),
            Some(&ctx.user_token),
        )
        .await?;
    assert_eq!(close.status(), StatusCode::OK);

    let close_again = app
        .post_json(
            &format!("/api/tickets/{code}/close"),
            &json!({}),
            Some(&ctx.user_token),
        )
        .await?;
    assert_eq!(close_again.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body_to_vec(close_again.into_body()).await?)?;
    assert_eq!(body["message"], "Ticket is already closed");

    // closed tickets take no responses and no edits
    let respond_closed = app
        .post_json(
            &format!("/api/tickets/{code}/responses"),
            &json!({ "body": "too late" }),
            Some(&ctx.agent_token),
        )
        .await?;
    assert_eq!(respond_closed.status(), StatusCode::FORBIDDEN);

    let edit_closed = app
        .put_json(
            &format!("/api/tickets/{code}"),
            &json!({ "title": "New title" }),
            Some(&ctx.user_token),
        )
        .await?;
    assert_eq!(edit_closed.status(), StatusCode::BAD_REQUEST);

    // reopen lands back on open
    let reopen = app
        .post_json(
            &format!("/api/tickets/{code}/reopen"),
            &json!({}),
            Some(&ctx.user_token),
        )
        .await?;
    assert_eq!(reopen.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(reopen.into_body()).await?)?;
    assert_eq!(body["status"], "open");
    assert!(body["resolved_at"].is_null());
    assert!(body["closed_at"].is_null());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn reopen_window_expires_after_thirty_days() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let ctx = seed(&app).await?;

    let ticket = create_ticket(&app, &ctx, "Stale").await?;
    let code = ticket["ticket_code"].as_str().unwrap().to_string();

    let close = app
        .post_json(
            &format!("/api/tickets/{code}/close"),
            &json!({}),
            Some(&ctx.user_token),
        )
        .await?;
    assert_eq!(close.status(), StatusCode::OK);

    // age the ticket past the window
    let stale_code = code.clone();
    app.with_conn(move |conn| {
        use helpdesk::schema::tickets::dsl;
        diesel::update(dsl::tickets.filter(dsl::ticket_code.eq(stale_code)))
            .set(dsl::updated_at.eq(Utc::now() - Duration::days(31)))
            .execute(conn)?;
        Ok(())
    })
    .await?;

    let reopen = app
        .post_json(
            &format!("/api/tickets/{code}/reopen"),
            &json!({}),
            Some(&ctx.user_token),
        )
        .await?;
    assert_eq!(reopen.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body_to_vec(reopen.into_body()).await?)?;
    assert_eq!(body["message"], "Reopen window has expired");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn assignment_requires_a_company_agent() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let ctx = seed(&app).await?;

    let ticket = create_ticket(&app, &ctx, "Assign me").await?;
    let code = ticket["ticket_code"].as_str().unwrap();

    // the reporter holds no AGENT role
    let bogus = app
        .post_json(
            &format!("/api/tickets/{code}/assign"),
            &json!({ "agent_id": ctx.user_id }),
            Some(&ctx.agent_token),
        )
        .await?;
    assert_eq!(bogus.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let agent_id = app
        .with_conn(|conn| {
            use helpdesk::schema::users::dsl;
            let id: Uuid = dsl::users
                .filter(dsl::email.eq("agent@example.com"))
                .select(dsl::id)
                .first(conn)?;
            Ok(id)
        })
        .await?;

    let assign = app
        .post_json(
            &format!("/api/tickets/{code}/assign"),
            &json!({ "agent_id": agent_id }),
            Some(&ctx.agent_token),
        )
        .await?;
    assert_eq!(assign.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(assign.into_body()).await?)?;
    assert_eq!(body["owner_agent_id"], agent_id.to_string());
    assert_eq!(body["status"], "pending");

    app.cleanup().await?;
    Ok(())
}
