//! The public directory as a tower service

use std::path::Path;
use tower_http::services::ServeDir;

/// Serve files under `root`
///
/// GET and HEAD only. Directories answer with their `index.html`, and a
/// directory path without a trailing slash is redirected to one. Paths that
/// would leave `root` are not found.
pub fn public_dir(root: &Path) -> ServeDir {
    ServeDir::new(root).append_index_html_on_directories(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Empty};
    use hyper::header::{ALLOW, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
    use hyper::{Method, Request, Response, StatusCode};
    use tower::ServiceExt;

    async fn request(root: &Path, method: Method, path: &str) -> Response<Bytes> {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Empty::<Bytes>::new())
            .unwrap();
        let response = public_dir(root).oneshot(req).await.unwrap();
        let (parts, body) = response.into_parts();
        let body = body.collect().await.unwrap().to_bytes();
        Response::from_parts(parts, body)
    }

    #[tokio::test]
    async fn test_get_and_head() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("site.css"), "body{}").unwrap();

        let response = request(dir.path(), Method::GET, "/site.css").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/css"));
        assert_eq!(response.body(), &Bytes::from_static(b"body{}"));

        let response = request(dir.path(), Method::HEAD, "/site.css").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "6");
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn test_directory_index_and_redirect() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("blog")).unwrap();
        std::fs::write(dir.path().join("blog/index.html"), "posts").unwrap();

        let response = request(dir.path(), Method::GET, "/blog/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &Bytes::from_static(b"posts"));

        let response = request(dir.path(), Method::GET, "/blog").await;
        assert!(response.status().is_redirection());
        assert_eq!(response.headers()[LOCATION], "/blog/");
    }

    #[tokio::test]
    async fn test_traversal_stays_inside_root() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("public");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(outer.path().join("secret.txt"), "keep out").unwrap();

        for path in ["/../secret.txt", "/%2e%2e/secret.txt", "/a/../../secret.txt"] {
            let response = request(&root, Method::GET, path).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", path);
            assert_ne!(response.body(), &Bytes::from_static(b"keep out"));
        }
    }

    #[tokio::test]
    async fn test_rejections() {
        let dir = tempfile::tempdir().unwrap();

        let response = request(dir.path(), Method::POST, "/").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers()[ALLOW].to_str().unwrap().contains("HEAD"));

        let response = request(dir.path(), Method::GET, "/nope.html").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // directory without an index
        let response = request(dir.path(), Method::GET, "/").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
