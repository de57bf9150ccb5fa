//! The object-storage seam used for PAR-URL uploads and downloads.
//!
//! ForestSens hands out pre-authenticated request (PAR) URLs per batch, so
//! the default backend speaks plain HTTP: PUT bytes under the PAR URL to
//! upload, GET to download. Nothing vendor-specific is assumed beyond
//! "push a file to a URL" and "fetch bytes from a URL"; anything that can do
//! that may implement [`ObjectStore`], which is also the hook tests use.

use async_trait::async_trait;
use bytes::Bytes;
use futures::prelude::*;
use futures::stream::BoxStream;
use std::path::Path;
use tokio::fs;
use tokio_util::codec;
use tracing::debug;
use url::Url;

use crate::errors::{Error, Result};

/// A stream of downloaded bytes.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Where uploaded objects go and downloaded artifacts come from.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `path` under `object_name`, relative to the
    /// pre-authenticated `par_url`.
    async fn upload(&self, par_url: &Url, object_name: &str, path: &Path)
        -> Result<()>;

    /// Fetch the object at `url` as a byte stream.
    async fn download(&self, url: &Url) -> Result<ByteStream>;
}

/// The default `ObjectStore`: plain HTTP against PAR URLs.
pub struct ParStore {
    http: reqwest::Client,
}

impl ParStore {
    /// Create a new `ParStore`.
    pub fn new() -> ParStore {
        ParStore {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for ParStore {
    fn default() -> Self {
        ParStore::new()
    }
}

#[async_trait]
impl ObjectStore for ParStore {
    async fn upload(
        &self,
        par_url: &Url,
        object_name: &str,
        path: &Path,
    ) -> Result<()> {
        let url = object_url(par_url, object_name)?;

        // Stream the file over the network without loading it into memory.
        let file = fs::File::open(path)
            .await
            .map_err(|err| Error::could_not_read_file(path, err))?;
        let err_path = path.to_owned();
        let stream = codec::FramedRead::new(file, codec::BytesCodec::new())
            .map_ok(|bytes| bytes.freeze())
            .map_err(move |err| Error::could_not_read_file(&err_path, err));

        debug!("PUT {}", url);
        let res = self
            .http
            .put(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|e| Error::transport(&url, e))?;
        let status = res.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = res
                .text()
                .await
                .map_err(|e| Error::transport(&url, e))?;
            debug!("upload error status: {} body: {}", status, body);
            Err(Error::from_response(&url, status, body))
        }
    }

    async fn download(&self, url: &Url) -> Result<ByteStream> {
        debug!("GET {}", url);
        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::transport(url, e))?;
        let status = res.status();
        if status.is_success() {
            let err_url = url.to_owned();
            Ok(res
                .bytes_stream()
                .map_err(move |e| Error::transport(&err_url, e))
                .boxed())
        } else {
            let body = res.text().await.map_err(|e| Error::transport(url, e))?;
            debug!("download error status: {} body: {}", status, body);
            Err(Error::from_response(url, status, body))
        }
    }
}

/// Join an object name onto a PAR URL. The PAR path is a prefix which may or
/// may not carry a trailing slash; object names may contain `/` separators
/// but never escape the prefix.
pub(crate) fn object_url(par_url: &Url, object_name: &str) -> Result<Url> {
    let mut base = par_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(object_name.trim_start_matches('/'))
        .map_err(|e| Error::could_not_parse_url(format!("{}{}", base, object_name), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use std::io::Write;

    #[test]
    fn object_urls_stay_under_the_par_prefix() {
        let par = Url::parse("https://objectstorage.example/p/TOKEN/n/ns/b/bkt/o").unwrap();
        let url = object_url(&par, "tiles/1.tif").unwrap();
        assert_eq!(
            url.as_str(),
            "https://objectstorage.example/p/TOKEN/n/ns/b/bkt/o/tiles/1.tif"
        );
        // A trailing slash on the PAR changes nothing.
        let par = Url::parse("https://objectstorage.example/p/TOKEN/n/ns/b/bkt/o/").unwrap();
        let url = object_url(&par, "/tiles/1.tif").unwrap();
        assert!(url.path().ends_with("/o/tiles/1.tif"));
    }

    #[tokio::test]
    async fn uploads_put_the_file_body_under_the_object_name() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", "/par/input/tile.tif"),
                request::body("fake raster bytes"),
            ])
            .respond_with(status_code(200)),
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"fake raster bytes").unwrap();
        file.flush().unwrap();

        let par = Url::parse(&server.url_str("/par/")).unwrap();
        let store = ParStore::new();
        store
            .upload(&par, "input/tile.tif", file.path())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_uploads_surface_the_status_and_body() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("PUT", "/par/bad.tif"))
                .respond_with(status_code(403).body("PAR expired")),
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"x").unwrap();

        let par = Url::parse(&server.url_str("/par/")).unwrap();
        let err = ParStore::new()
            .upload(&par, "bad.tif", file.path())
            .await
            .unwrap_err();
        match err {
            Error::Auth { body, .. } => assert_eq!(body, "PAR expired"),
            other => panic!("expected Auth, got {}", other),
        }
    }

    #[tokio::test]
    async fn downloads_stream_the_body() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/par/out.gpkg"))
                .respond_with(status_code(200).body("result bytes")),
        );

        let url = Url::parse(&server.url_str("/par/out.gpkg")).unwrap();
        let mut stream = ParStore::new().download(&url).await.unwrap();
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(bytes, b"result bytes");
    }
}
