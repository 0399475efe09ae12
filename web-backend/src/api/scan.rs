use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Responder};
use futures_util::TryStreamExt;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use deepscan_core::error::ScanError;
use deepscan_core::Artifact;

use crate::state::AppState;

// 上传大小上限
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024; // 1GB

pub fn configure_scan_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // RESTful 风格路由
        .route("/upload", web::post().to(upload_and_scan)) // POST /api/scans/upload
        .route("", web::get().to(list_scans))              // GET  /api/scans
        .route("/{uuid}", web::get().to(get_scan));        // GET  /api/scans/{uuid}
}

#[derive(Serialize)]
pub struct ScanSummary {
    pub id: i64,
    pub uuid: String,
    pub filename: String,
    pub risk_level: String,
    pub scanned_at: String,
}

/// 上传一个工件并同步扫描。归档被安全校验拒绝时返回 400；
/// 个别引擎失败不影响响应，失败状态在记录里可见
pub async fn upload_and_scan(state: web::Data<AppState>, mut payload: Multipart) -> impl Responder {
    // 每次上传独立的临时目录，扫描结束后随 Artifact 一起销毁
    let scratch = match tempfile::Builder::new().prefix("deepscan-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to create temp dir: {}", e)
            }));
        }
    };

    let mut saved: Option<(PathBuf, String)> = None;

    loop {
        match payload.try_next().await {
            Ok(Some(mut field)) => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or("unknown")
                    .to_string();
                // 只保留最后一个路径分量，防止构造的文件名逃出临时目录
                let filename = Path::new(&filename)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown")
                    .to_string();

                let data = match field.bytes(MAX_UPLOAD_BYTES).await {
                    Ok(Ok(bytes)) => Vec::from(bytes.as_ref()),
                    Ok(Err(e)) => {
                        return HttpResponse::InternalServerError().json(serde_json::json!({
                            "error": format!("Failed to read field: {}", e)
                        }));
                    }
                    Err(_) => {
                        return HttpResponse::BadRequest().json(serde_json::json!({
                            "error": "File size limit exceeded"
                        }));
                    }
                };

                // 保存文件
                let file_path = scratch.path().join(&filename);
                match std::fs::File::create(&file_path) {
                    Ok(mut file) => {
                        if let Err(e) = file.write_all(&data) {
                            return HttpResponse::InternalServerError().json(serde_json::json!({
                                "error": format!("Failed to write file: {}", e)
                            }));
                        }
                    }
                    Err(e) => {
                        return HttpResponse::InternalServerError().json(serde_json::json!({
                            "error": format!("Failed to create file: {}", e)
                        }));
                    }
                }
                saved = Some((file_path, filename));
            }
            Ok(None) => {
                // 没有更多字段了，退出循环
                break;
            }
            Err(_) => {
                break;
            }
        }
    }

    let (file_path, filename) = match saved {
        Some(saved) => saved,
        None => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "No file uploaded"
            }));
        }
    };

    let artifact = match Artifact::with_scratch(scratch, file_path, filename) {
        Ok(artifact) => artifact,
        Err(e) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to stage artifact: {}", e)
            }));
        }
    };

    match state.orchestrator.scan(artifact).await {
        Ok(record) => HttpResponse::Ok().json(record),
        Err(e @ ScanError::UnsafeArchive(_)) => HttpResponse::BadRequest().json(
            serde_json::json!({
                "error": e.to_string()
            }),
        ),
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Scan failed: {}", e)
        })),
    }
}

/// 扫描历史，新的在前
pub async fn list_scans(state: web::Data<AppState>) -> impl Responder {
    let rows = match sqlx::query_as::<_, (i64, String, String, String, String)>(
        "SELECT id, uuid, filename, risk_level, scanned_at
         FROM scans
         ORDER BY id DESC",
    )
    .fetch_all(&state.db)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to fetch scans: {}", e)
            }));
        }
    };

    let scans: Vec<ScanSummary> = rows
        .into_iter()
        .map(|(id, uuid, filename, risk_level, scanned_at)| ScanSummary {
            id,
            uuid,
            filename,
            risk_level,
            scanned_at,
        })
        .collect();

    HttpResponse::Ok().json(scans)
}

/// 按 uuid 取完整记录，引擎结果从 JSON 列还原
pub async fn get_scan(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let uuid = path.into_inner();

    let row = match sqlx::query_as::<_, (String, String, String, String, String, String, String)>(
        "SELECT uuid, filename, artifact_kind, sha1, engine_results, risk_level, scanned_at
         FROM scans
         WHERE uuid = ?",
    )
    .bind(&uuid)
    .fetch_optional(&state.db)
    .await
    {
        Ok(row) => row,
        Err(e) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to fetch scan: {}", e)
            }));
        }
    };

    let (uuid, filename, artifact_kind, sha1, engine_results, risk_level, scanned_at) = match row {
        Some(row) => row,
        None => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": format!("Scan not found: {}", uuid)
            }));
        }
    };

    let engine_results: serde_json::Value =
        serde_json::from_str(&engine_results).unwrap_or(serde_json::Value::Null);

    HttpResponse::Ok().json(serde_json::json!({
        "id": uuid,
        "filename": filename,
        "artifact_kind": artifact_kind,
        "sha1": sha1,
        "engine_results": engine_results,
        "risk_level": risk_level,
        "scanned_at": scanned_at,
    }))
}
