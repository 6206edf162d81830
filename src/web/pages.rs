//! Server-rendered browse pages.
//!
//! The HTML surface mirrors the JSON API: a folder listing with upload and
//! create-folder forms. Form posts redirect back to the folder with a flash
//! message carried in the `msg` query parameter.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap},
    response::{Html, Redirect},
    Form,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::storage::{
    marker_key, merge_listing, normalize_folder, safe_filename, Entry,
};
use crate::web::handlers::{fetch_source, parse_upload, store_upload, AppState};

/// Query parameters for the browse pages.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Flash message from a redirect.
    #[serde(default)]
    pub msg: Option<String>,
}

/// Form body for folder creation.
#[derive(Debug, Deserialize)]
pub struct CreateFolderForm {
    /// New folder name.
    pub name: String,
    /// Parent folder.
    #[serde(default)]
    pub folder: String,
}

/// Browse URL for a folder (the root is `/`).
fn browse_url(folder: &str) -> String {
    if folder.is_empty() {
        "/".to_string()
    } else {
        format!(
            "/browse/{}",
            urlencoding::encode(folder).replace("%2F", "/")
        )
    }
}

/// Browse URL carrying a flash message.
fn flash_url(folder: &str, msg: &str) -> String {
    let base = browse_url(folder);
    format!("{base}?msg={}", urlencoding::encode(msg))
}

/// Folder the request came from, recovered from the Referer header.
///
/// Fallback for form errors where the body (and its folder field) could not
/// be read, so the error flash still lands on the page the user was on.
fn folder_from_referer(headers: &HeaderMap) -> String {
    headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(|r| r.split("/browse/").nth(1))
        .map(|rest| rest.split('?').next().unwrap_or(""))
        .and_then(|raw| urlencoding::decode(raw).ok())
        .and_then(|f| normalize_folder(&f).ok())
        .unwrap_or_default()
}

/// Minimal HTML escaping for text nodes and attribute values.
fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Human-readable byte size.
fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn render_entry_row(entry: &Entry) -> String {
    let name = html_escape(&entry.name);
    if entry.is_dir {
        format!(
            "<tr><td>&#128193; <a href=\"{href}\">{name}/</a></td><td></td><td></td>\
             <td><button onclick=\"removeFolder('{path}')\">Delete</button></td></tr>\n",
            href = html_escape(&browse_url(&entry.path)),
            path = html_escape(&entry.path),
        )
    } else {
        let size = entry.size.map(format_size).unwrap_or_default();
        let link = match &entry.download_url {
            Some(url) => format!("<a href=\"{}\">{name}</a>", html_escape(url)),
            None => name.clone(),
        };
        format!(
            "<tr><td>{link}</td><td>{size}</td><td>{mime}</td>\
             <td><button onclick=\"removeFile('{path}')\">Delete</button></td></tr>\n",
            mime = html_escape(entry.mime_type.as_deref().unwrap_or("")),
            path = html_escape(&entry.path),
        )
    }
}

/// Render a folder listing page.
fn render_page(folder: &str, entries: &[Entry], msg: Option<&str>) -> Html<String> {
    let mut body = String::new();
    body.push_str("<!doctype html><html><head><meta charset=\"utf-8\"><title>shelf</title></head><body>\n");
    body.push_str("<h1>shelf</h1>\n");

    if let Some(msg) = msg {
        if !msg.is_empty() {
            body.push_str(&format!("<p><em>{}</em></p>\n", html_escape(msg)));
        }
    }

    // Breadcrumb
    body.push_str("<p><a href=\"/\">root</a>");
    let mut crumb = String::new();
    for segment in folder.split('/').filter(|s| !s.is_empty()) {
        if !crumb.is_empty() {
            crumb.push('/');
        }
        crumb.push_str(segment);
        body.push_str(&format!(
            " / <a href=\"{}\">{}</a>",
            html_escape(&browse_url(&crumb)),
            html_escape(segment)
        ));
    }
    body.push_str("</p>\n");

    body.push_str("<table border=\"1\" cellpadding=\"4\">\n");
    body.push_str("<tr><th>Name</th><th>Size</th><th>Type</th><th></th></tr>\n");
    if entries.is_empty() {
        body.push_str("<tr><td colspan=\"4\"><em>empty folder</em></td></tr>\n");
    }
    for entry in entries {
        body.push_str(&render_entry_row(entry));
    }
    body.push_str("</table>\n");

    let folder_attr = html_escape(folder);
    body.push_str(&format!(
        "<h2>Upload</h2>\n\
         <form action=\"/upload\" method=\"post\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"file\">\n\
         or URL: <input type=\"text\" name=\"url\" size=\"40\">\n\
         <input type=\"hidden\" name=\"folder\" value=\"{folder_attr}\">\n\
         <input type=\"submit\" value=\"Upload\">\n\
         </form>\n\
         <h2>New folder</h2>\n\
         <form action=\"/create_folder\" method=\"post\">\n\
         <input type=\"text\" name=\"name\">\n\
         <input type=\"hidden\" name=\"folder\" value=\"{folder_attr}\">\n\
         <input type=\"submit\" value=\"Create\">\n\
         </form>\n"
    ));

    body.push_str(
        "<script>\n\
         function removeFile(path) {\n\
           if (!confirm('Delete ' + path + '?')) return;\n\
           fetch('/api/files/' + path, { method: 'DELETE' }).then(() => location.reload());\n\
         }\n\
         function removeFolder(path) {\n\
           if (!confirm('Delete folder ' + path + ' and everything in it?')) return;\n\
           fetch('/api/folders/' + path, { method: 'DELETE' }).then(() => location.reload());\n\
         }\n\
         </script>\n",
    );
    body.push_str("</body></html>\n");
    Html(body)
}

/// GET / - Root folder listing.
pub async fn index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Html<String> {
    let entries = merge_listing(state.tree.as_ref(), state.flat.as_deref(), "").await;
    render_page("", &entries, query.msg.as_deref())
}

/// GET /browse/{folder} - Folder listing.
pub async fn browse(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, Redirect> {
    let folder = match normalize_folder(&folder) {
        Ok(folder) => folder,
        Err(e) => return Err(Redirect::to(&flash_url("", &e.to_string()))),
    };
    let entries = merge_listing(state.tree.as_ref(), state.flat.as_deref(), &folder).await;
    Ok(render_page(&folder, &entries, query.msg.as_deref()))
}

/// POST /upload - Browser form upload; redirects back with a flash message.
pub async fn upload_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Redirect {
    let form = match parse_upload(multipart).await {
        Ok(form) => form,
        Err(e) => {
            let folder = folder_from_referer(&headers);
            return Redirect::to(&flash_url(&folder, e.message()));
        }
    };
    let folder = form.folder.clone();

    let (filename, content) = match (form.filename, form.content, form.source_url) {
        (Some(name), Some(bytes), _) => (name, bytes),
        (_, _, Some(url)) => {
            match fetch_source(&state.fetch_client, &url, state.max_upload_size).await {
                Ok(fetched) => fetched,
                Err(e) => return Redirect::to(&flash_url(&folder, &e.to_string())),
            }
        }
        _ => return Redirect::to(&flash_url(&folder, "No file uploaded.")),
    };

    match store_upload(&state, &filename, &folder, &content).await {
        Ok((key, _)) => {
            tracing::info!(key = %key, size = content.len(), "uploaded file via form");
            Redirect::to(&flash_url(&folder, "File uploaded."))
        }
        Err(e) => Redirect::to(&flash_url(&folder, &e.to_string())),
    }
}

/// POST /create_folder - Create a folder by committing its marker object.
pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CreateFolderForm>,
) -> Redirect {
    let parent = match normalize_folder(&form.folder) {
        Ok(parent) => parent,
        Err(e) => return Redirect::to(&flash_url("", &e.to_string())),
    };

    let name = safe_filename(&form.name);
    if name.is_empty() {
        return Redirect::to(&flash_url(&parent, "Folder name is empty."));
    }

    let target = crate::storage::join(&parent, &name);
    let marker = marker_key(&target);
    let message = format!("Create folder {target} @ {}", Utc::now().to_rfc3339());

    match state.tree.put(&marker, b"", &message).await {
        Ok(_) => Redirect::to(&flash_url(&target, "Folder created.")),
        Err(e) => {
            tracing::warn!(folder = %target, error = %e, "failed to create folder");
            Redirect::to(&flash_url(&parent, &e.to_string()))
        }
    }
}
