//! Minimal static file server over an [`AssetFs`].
//!
//! `tiny_http` parses requests on its own connection threads. Requests are
//! handed to the tokio blocking pool, where the file is opened and streamed
//! into the response. Only `GET` and `HEAD` are served.

use std::io::{Cursor, Read};
use std::thread;

use tiny_http::{Header, Method, Request, Response, ResponseBox, Server, StatusCode};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::file::{File, FileInfo};
use crate::lifecycle::AssetFs;

/// Requests accepted but not yet picked up by a worker.
const QUEUE_DEPTH: usize = 64;

pub type Body = Box<dyn Read + Send>;

/// Status, type and body of an answer, before it is handed to `tiny_http`.
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    /// Body length if known up front; unknown lengths are sent chunked
    pub length: Option<usize>,
    pub body: Body,
}

impl Reply {
    fn bytes(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            length: Some(body.len()),
            body: Box::new(Cursor::new(body)),
        }
    }

    fn file(content_type: &'static str, file: File, info: &FileInfo) -> Self {
        Self {
            status: 200,
            content_type,
            length: usize::try_from(info.size()).ok(),
            body: Box::new(file),
        }
    }

    fn status(status: u16) -> Self {
        let text = format!("{} {}\n", status, StatusCode(status).default_reason_phrase());
        Self {
            status,
            ..Self::bytes("text/plain; charset=utf-8", text.into_bytes())
        }
    }

    pub fn into_response(self) -> ResponseBox {
        let headers = Header::from_bytes(&b"Content-Type"[..], self.content_type.as_bytes())
            .into_iter()
            .collect();
        Response::new(StatusCode(self.status), headers, self.body, self.length, None)
    }
}

/// Absolute, percent-decoded path of a request target.
///
/// Accepts origin form (`/a/b.txt?x=1`) and absolute form
/// (`http://host/a/b.txt`). `None` for anything else.
pub fn request_path(url: &str) -> Option<String> {
    let target = if url.starts_with('/') {
        url
    } else {
        let (_, rest) = url.split_once("://")?;
        rest.find('/').map_or("/", |slash| &rest[slash..])
    };

    let raw = target.split(['?', '#']).next().unwrap_or_default();
    if !raw.starts_with('/') {
        return None;
    }
    urlencoding::decode(raw).ok().map(|path| path.into_owned())
}

/// Build the reply for `path`. Blocking.
pub fn respond(fs: &AssetFs, path: &str) -> Reply {
    match load(fs, path) {
        Ok(reply) => reply,
        Err(Error::NotExist) => Reply::status(404),
        Err(err) => {
            warn!(path, error = %err, "failed to serve asset");
            Reply::status(500)
        }
    }
}

fn load(fs: &AssetFs, path: &str) -> Result<Reply> {
    let mut file = fs.open(path)?;
    let info = file.stat()?;

    if !info.is_dir() {
        return Ok(Reply::file(content_type(path), file, &info));
    }

    let index = format!("{}/index.html", path.trim_end_matches('/'));
    match fs.open(&index) {
        Ok(index_file) => {
            let index_info = index_file.stat()?;
            Ok(Reply::file("text/html; charset=utf-8", index_file, &index_info))
        }
        Err(Error::NotExist) => {
            let children = file.list_children(None)?;
            Ok(Reply::bytes(
                "text/html; charset=utf-8",
                listing(path, &children).into_bytes(),
            ))
        }
        Err(err) => Err(err),
    }
}

/// Guess the MIME type based on file extension.
pub fn content_type(path: &str) -> &'static str {
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("wasm") => "application/wasm",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

fn listing(path: &str, children: &[FileInfo]) -> String {
    let mut html = format!("<!doctype html>\n<title>{0}</title>\n<pre>\n", escape(path));
    for child in children {
        let suffix = if child.is_dir() { "/" } else { "" };
        let name = format!("{}{}", child.name(), suffix);
        html.push_str(&format!(
            "<a href=\"{}\">{}</a>\n",
            urlencoding::encode(&name).replace("%2F", "/"),
            escape(&name)
        ));
    }
    html.push_str("</pre>\n");
    html
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Answer one request. `HEAD` bodies are dropped by `tiny_http`.
fn handle(request: Request, fs: &AssetFs) {
    let reply = match request.method() {
        Method::Get | Method::Head => match request_path(request.url()) {
            Some(path) => respond(fs, &path),
            None => Reply::status(400),
        },
        _ => Reply::status(405),
    };

    info!(
        peer = ?request.remote_addr(),
        method = %request.method(),
        url = request.url(),
        status = reply.status,
        "request"
    );

    if let Err(err) = request.respond(reply.into_response()) {
        debug!(error = %err, "failed to send response");
    }
}

/// Serve requests from `server` until it stops accepting.
pub async fn run(server: Server, fs: AssetFs) {
    let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);

    // tiny_http blocks on accept; keep that off the runtime.
    thread::spawn(move || {
        for request in server.incoming_requests() {
            if tx.blocking_send(request).is_err() {
                break;
            }
        }
    });

    while let Some(request) = rx.recv().await {
        let fs = fs.clone();
        tokio::task::spawn_blocking(move || handle(request, &fs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::lifecycle::Lifecycle;
    use std::fs;
    use std::sync::Arc;

    fn fallback_fs() -> (tempfile::TempDir, AssetFs) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hi.txt"), "hi\n").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/index.html"), "<h1>docs</h1>").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();

        let binary = dir.path().join("app");
        fs::write(&binary, b"no archive here").unwrap();
        let lifecycle = Arc::new(Lifecycle::new(Options::new().binary(&binary)));
        let assets = lifecycle.initialize(Some(dir.path()));
        (dir, assets)
    }

    fn body(reply: Reply) -> Vec<u8> {
        let mut out = Vec::new();
        let mut body = reply.body;
        body.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn request_targets() {
        assert_eq!(request_path("/a%20b.txt?x=1").as_deref(), Some("/a b.txt"));
        assert_eq!(request_path("/#top").as_deref(), Some("/"));
        assert_eq!(
            request_path("http://localhost/hi.txt").as_deref(),
            Some("/hi.txt")
        );
        assert_eq!(request_path("http://localhost:8000").as_deref(), Some("/"));
        assert_eq!(
            request_path("/redirect?to=http://x/y").as_deref(),
            Some("/redirect")
        );
        assert_eq!(request_path("*"), None);
        assert_eq!(request_path("relative"), None);
    }

    #[test]
    fn serves_files_and_directories() {
        let (_dir, assets) = fallback_fs();

        let hi = respond(&assets, "/hi.txt");
        assert_eq!(hi.status, 200);
        assert_eq!(hi.content_type, "text/plain; charset=utf-8");
        assert_eq!(hi.length, Some(3));
        assert_eq!(body(hi), b"hi\n");

        let docs = respond(&assets, "/docs/");
        assert_eq!(docs.status, 200);
        assert_eq!(body(docs), b"<h1>docs</h1>");

        let empty = respond(&assets, "/empty");
        assert_eq!(empty.status, 200);
        assert!(String::from_utf8(body(empty)).unwrap().contains("<pre>"));

        assert_eq!(respond(&assets, "/missing").status, 404);
        assert_eq!(respond(&assets, "/hi.txt/").status, 404);
    }

    #[test]
    fn status_replies_carry_reason() {
        let reply = Reply::status(405);
        assert_eq!(reply.length, Some(23));
        assert_eq!(body(reply), b"405 Method Not Allowed\n");
    }

    #[test]
    fn listing_escapes_names() {
        let html = listing("/<x>", &[FileInfo::directory("a&b")]);
        assert!(html.contains("<title>/&lt;x&gt;</title>"));
        assert!(html.contains(">a&amp;b/</a>"));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type("/index.HTML"), "text/html; charset=utf-8");
        assert_eq!(content_type("/a.b/file"), "application/octet-stream");
        assert_eq!(content_type("/app.wasm"), "application/wasm");
    }
}
