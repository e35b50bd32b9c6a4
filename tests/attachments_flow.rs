mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{acquire_db_lock, body_to_vec, TestApp};
use diesel::prelude::*;
use helpdesk::policy::Role;
use serde_json::{json, Value};
use uuid::Uuid;

struct Ctx {
    user_token: String,
    agent_token: String,
    ticket_code: String,
}

async fn seed(app: &TestApp) -> Result<Ctx> {
    let admin = app
        .insert_user("admin@example.com", "adminpass", &[(Role::User, None)])
        .await?;
    let company = app.insert_company("Acme", admin).await?;
    let category = app.insert_category(company, "Hardware").await?;

    let user_id = app
        .insert_user("reporter@example.com", "userpass", &[(Role::User, None)])
        .await?;
    app.insert_user(
        "agent@example.com",
        "agentpass",
        &[(Role::User, None), (Role::Agent, Some(company))],
    )
    .await?;
    app.follow_company(user_id, company).await?;

    let user_token = app.login_token("reporter@example.com", "userpass").await?;
    let agent_token = app.login_token("agent@example.com", "agentpass").await?;

    let response = app
        .post_json(
            "/api/tickets",
            &json!({
                "company_id": company,
                "category_id": category,
                "title": "Broken screen",
                "description": "It cracked."
            }),
            Some(&user_token),
        )
        .await?;
    anyhow::ensure!(response.status() == StatusCode::CREATED, "seed ticket failed");
    let ticket: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;

    Ok(Ctx {
        user_token,
        agent_token,
        ticket_code: ticket["ticket_code"].as_str().unwrap().to_string(),
    })
}

#[tokio::test]
async fn extension_allowlist_is_enforced() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let ctx = seed(&app).await?;
    let path = format!("/api/tickets/{}/attachments", ctx.ticket_code);

    let payload = vec![0u8; 2048];

    let exe = app
        .upload_attachment(
            &path,
            "malware.exe",
            "application/octet-stream",
            &payload,
            None,
            &ctx.user_token,
        )
        .await?;
    assert_eq!(exe.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_slice(&body_to_vec(exe.into_body()).await?)?;
    assert_eq!(body["errors"]["file"][0], "Invalid file type.");

    // same bytes, allowed extension
    let pdf = app
        .upload_attachment(
            &path,
            "report.pdf",
            "application/pdf",
            &payload,
            None,
            &ctx.user_token,
        )
        .await?;
    assert_eq!(pdf.status(), StatusCode::CREATED);
    let body: Value = serde_json::from_slice(&body_to_vec(pdf.into_body()).await?)?;
    assert_eq!(body["file_type"], "pdf");
    assert_eq!(body["file_size_bytes"], 2048);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn oversize_uploads_get_413() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let ctx = seed(&app).await?;
    let path = format!("/api/tickets/{}/attachments", ctx.ticket_code);

    let oversized = vec![0u8; 10 * 1024 * 1024 + 1];
    let response = app
        .upload_attachment(
            &path,
            "huge.pdf",
            "application/pdf",
            &oversized,
            None,
            &ctx.user_token,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body["errors"]["file"][0], "File size must not exceed 10 MB.");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn the_sixth_attachment_is_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let ctx = seed(&app).await?;
    let path = format!("/api/tickets/{}/attachments", ctx.ticket_code);

    // a response-linked attachment counts against the same cap
    let response = app
        .post_json(
            &format!("/api/tickets/{}/responses", ctx.ticket_code),
            &json!({ "body": "see attached" }),
            Some(&ctx.agent_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let response_body: Value =
        serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    let response_id = Uuid::parse_str(response_body["id"].as_str().unwrap())?;

    let first = app
        .upload_attachment(
            &path,
            "notes-0.txt",
            "text/plain",
            b"notes",
            Some(response_id),
            &ctx.agent_token,
        )
        .await?;
    assert_eq!(first.status(), StatusCode::CREATED);

    for i in 1..5 {
        let upload = app
            .upload_attachment(
                &path,
                &format!("notes-{i}.txt"),
                "text/plain",
                b"notes",
                None,
                &ctx.user_token,
            )
            .await?;
        assert_eq!(upload.status(), StatusCode::CREATED);
    }

    let sixth = app
        .upload_attachment(
            &path,
            "notes-5.txt",
            "text/plain",
            b"notes",
            None,
            &ctx.user_token,
        )
        .await?;
    assert_eq!(sixth.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_slice(&body_to_vec(sixth.into_body()).await?)?;
    assert_eq!(body["errors"]["file"][0], "Maximum 5 attachments per ticket.");

    let list = app.get(&path, Some(&ctx.user_token)).await?;
    let body: Value = serde_json::from_slice(&body_to_vec(list.into_body()).await?)?;
    assert_eq!(body.as_array().unwrap().len(), 5);
    assert_eq!(app.storage().object_count().await, 5);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn deletion_is_uploader_only_and_time_boxed() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let ctx = seed(&app).await?;
    let path = format!("/api/tickets/{}/attachments", ctx.ticket_code);

    let upload = app
        .upload_attachment(
            &path,
            "evidence.png",
            "image/png",
            b"pixels",
            None,
            &ctx.user_token,
        )
        .await?;
    assert_eq!(upload.status(), StatusCode::CREATED);
    let attachment: Value = serde_json::from_slice(&body_to_vec(upload.into_body()).await?)?;
    let attachment_id = attachment["id"].as_str().unwrap().to_string();
    let delete_path = format!("{path}/{attachment_id}");

    // not the uploader
    let foreign = app.delete(&delete_path, Some(&ctx.agent_token)).await?;
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.storage().object_count().await, 1);

    // age past the window
    let aged = Uuid::parse_str(&attachment_id)?;
    app.with_conn(move |conn| {
        use helpdesk::schema::ticket_attachments::dsl;
        diesel::update(dsl::ticket_attachments.find(aged))
            .set(dsl::created_at.eq(Utc::now() - Duration::minutes(31)))
            .execute(conn)?;
        Ok(())
    })
    .await?;

    let expired = app.delete(&delete_path, Some(&ctx.user_token)).await?;
    assert_eq!(expired.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.storage().object_count().await, 1);

    // back inside the window, the uploader may delete
    let fresh = Uuid::parse_str(&attachment_id)?;
    app.with_conn(move |conn| {
        use helpdesk::schema::ticket_attachments::dsl;
        diesel::update(dsl::ticket_attachments.find(fresh))
            .set(dsl::created_at.eq(Utc::now()))
            .execute(conn)?;
        Ok(())
    })
    .await?;

    let delete = app.delete(&delete_path, Some(&ctx.user_token)).await?;
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.storage().object_count().await, 0);

    // the row is gone
    let again = app.delete(&delete_path, Some(&ctx.user_token)).await?;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn closed_tickets_refuse_uploads_and_deletions() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let ctx = seed(&app).await?;
    let path = format!("/api/tickets/{}/attachments", ctx.ticket_code);

    let upload = app
        .upload_attachment(
            &path,
            "before-close.txt",
            "text/plain",
            b"data",
            None,
            &ctx.user_token,
        )
        .await?;
    assert_eq!(upload.status(), StatusCode::CREATED);
    let attachment: Value = serde_json::from_slice(&body_to_vec(upload.into_body()).await?)?;
    let attachment_id = attachment["id"].as_str().unwrap();

    let close = app
        .post_json(
            &format!("/api/tickets/{}/close", ctx.ticket_code),
            &json!({}),
            Some(&ctx.user_token),
        )
        .await?;
    assert_eq!(close.status(), StatusCode::OK);

    let upload_closed = app
        .upload_attachment(
            &path,
            "after-close.txt",
            "text/plain",
            b"data",
            None,
            &ctx.user_token,
        )
        .await?;
    assert_eq!(upload_closed.status(), StatusCode::FORBIDDEN);
    let body: Value = serde_json::from_slice(&body_to_vec(upload_closed.into_body()).await?)?;
    assert_eq!(body["message"], "Cannot upload attachments to a closed ticket.");

    let delete_closed = app
        .delete(&format!("{path}/{attachment_id}"), Some(&ctx.user_token))
        .await?;
    assert_eq!(delete_closed.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.storage().object_count().await, 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn downloads_stream_the_original_file() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let ctx = seed(&app).await?;
    let path = format!("/api/tickets/{}/attachments", ctx.ticket_code);

    let upload = app
        .upload_attachment(
            &path,
            "log excerpt.txt",
            "text/plain",
            b"line one\nline two\n",
            None,
            &ctx.user_token,
        )
        .await?;
    assert_eq!(upload.status(), StatusCode::CREATED);
    let attachment: Value = serde_json::from_slice(&body_to_vec(upload.into_body()).await?)?;
    let attachment_id = attachment["id"].as_str().unwrap();

    let download = app
        .get(
            &format!("{path}/{attachment_id}/download"),
            Some(&ctx.agent_token),
        )
        .await?;
    assert_eq!(download.status(), StatusCode::OK);
    let disposition = download
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("log excerpt.txt"));
    let bytes = body_to_vec(download.into_body()).await?;
    assert_eq!(bytes, b"line one\nline two\n");

    app.cleanup().await?;
    Ok(())
}
