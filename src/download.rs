//! Document acquisition state machine.
//!
//! Turns a [`DownloadInfo`] entry point into retrieved documents. Each HTTP
//! response is classified by content: a direct binary is terminal, an
//! ASP.NET verification page is bypassed with a form POST, and a listing
//! page fans out over its document links. Recursion depth is bounded so a
//! malformed or adversarial page chain cannot loop forever.

use scraper::Html;
use std::future::Future;
use std::pin::Pin;

use crate::errors::{PipelineError, Result};
use crate::extract::{self, DownloadInfo};
use crate::transport::{HttpResponse, HttpTransport};

/// Content types accepted as terminal document payloads (prefix-matched).
const ACCEPTED_TYPES: [&str; 2] = ["application/pdf", "application/octet-stream"];

/// Hidden-field token marking an anti-automation verification page.
const VIEWSTATE_MARKER: &str = "__VIEWSTATE";

/// Depths 0 and 1 are legal; reaching 2 is fatal.
const MAX_DEPTH: u8 = 1;

/// Browser-like headers for the verification POST; the gate rejects obvious
/// non-browser clients.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// One retrieved artifact. `name` is `None` when neither a
/// Content-Disposition filename nor a sibling index was available; the
/// document store derives a name from the lead document instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredDocument {
    pub name: Option<String>,
    pub bytes: Vec<u8>,
}

pub struct DownloadEngine<T: HttpTransport> {
    transport: T,
    verification_email: String,
}

impl<T: HttpTransport> DownloadEngine<T> {
    pub fn new(transport: T, verification_email: impl Into<String>) -> Self {
        Self {
            transport,
            verification_email: verification_email.into(),
        }
    }

    /// Retrieve every document reachable from the entry link.
    ///
    /// Any failure aborts the whole acquisition; there are no retries here
    /// and no partial success.
    pub async fn acquire(&self, info: &DownloadInfo) -> Result<Vec<AcquiredDocument>> {
        log::info!("acquiring documents from {}", info.source);
        let response = self.fetch(&info.source).await?;
        self.process_response(response, 0, None).await
    }

    async fn fetch(&self, url: &str) -> Result<HttpResponse> {
        let response = self.transport.get(url).await?;
        Self::check_status(response)
    }

    fn check_status(response: HttpResponse) -> Result<HttpResponse> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(PipelineError::Transport {
                url: response.url.clone(),
                message: format!("unexpected status {}", response.status),
            })
        }
    }

    /// Classify one response and recurse as needed. `index` is the position
    /// among sibling documents at this level, used for fallback filenames.
    fn process_response<'a>(
        &'a self,
        response: HttpResponse,
        depth: u8,
        index: Option<usize>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AcquiredDocument>>> + Send + 'a>> {
        Box::pin(async move {
            if depth > MAX_DEPTH {
                return Err(PipelineError::RecursionLimit {
                    depth,
                    url: response.url.clone(),
                });
            }

            let content_type = response.header("content-type").to_lowercase();

            if ACCEPTED_TYPES
                .iter()
                .any(|accepted| content_type.starts_with(accepted))
            {
                let name = extract::filename_from_disposition(response.header("content-disposition"))
                    .or_else(|| index.map(|i| format!("attachment_{i}")));
                log::debug!(
                    "received document from {} ({} bytes, name {:?})",
                    response.url,
                    response.body.len(),
                    name
                );
                return Ok(vec![AcquiredDocument {
                    name,
                    bytes: response.body,
                }]);
            }

            if !content_type.starts_with("text/html") {
                return Err(PipelineError::UnknownContentType {
                    content_type,
                    url: response.url.clone(),
                });
            }

            let text = response.text();
            let page_url = response.url.clone();

            if text.contains(VIEWSTATE_MARKER) {
                log::debug!("verification form at {page_url} (depth {depth})");
                let post_response = self.bypass_verification_form(&text, &page_url).await?;
                return self.process_response(post_response, depth + 1, None).await;
            }

            // Listing page: fan out sequentially so sibling indexes stay
            // deterministic.
            let candidates = {
                let document = Html::parse_document(&text);
                extract::extract_candidate_links(&document, &page_url)
            };
            if candidates.is_empty() {
                return Err(PipelineError::NoLinksFound { url: page_url });
            }
            log::debug!("{} candidate links at {page_url}", candidates.len());

            let mut documents = Vec::new();
            for (i, candidate) in candidates.iter().enumerate() {
                let response = self.fetch(&candidate.source).await?;
                documents.extend(self.process_response(response, depth + 1, Some(i)).await?);
            }
            Ok(documents)
        })
    }

    /// Submit the ASP.NET email-verification form and hand back the gated
    /// response. Requires all three hidden fields to be present.
    async fn bypass_verification_form(
        &self,
        page_text: &str,
        page_url: &str,
    ) -> Result<HttpResponse> {
        let (fields, post_url) = {
            let document = Html::parse_document(page_text);
            let fields = extract::extract_form_fields(&document)?;
            let post_url = extract::extract_post_url(&document, page_url);
            (fields, post_url)
        };

        let body = build_form_body(&fields, &self.verification_email);
        let headers = vec![
            ("user-agent".to_string(), BROWSER_USER_AGENT.to_string()),
            ("accept".to_string(), BROWSER_ACCEPT.to_string()),
            (
                "content-type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            ),
            ("referer".to_string(), page_url.to_string()),
        ];

        log::debug!("submitting verification form to {post_url}");
        let response = self.transport.post(&post_url, &headers, body).await?;
        Self::check_status(response)
    }
}

/// Urlencoded body for the verification POST: the hidden bypass fields plus
/// the verification email (duplicated into both identity fields) and the two
/// "Validate" buttons.
fn build_form_body(fields: &[(String, String)], email: &str) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in fields {
        form.append_pair(name, value);
    }
    form.append_pair("emailAddress", email);
    form.append_pair("username", email);
    form.append_pair("SubmitEmailAddressButton", "Validate");
    form.append_pair("SubmitUsernameButton", "Validate");
    form.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockTransport {
        gets: HashMap<String, HttpResponse>,
        posts: HashMap<String, HttpResponse>,
        requests: Mutex<Vec<String>>,
        post_bodies: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn on_get(mut self, url: &str, response: HttpResponse) -> Self {
            self.gets.insert(url.to_string(), response);
            self
        }

        fn on_post(mut self, url: &str, response: HttpResponse) -> Self {
            self.posts.insert(url.to_string(), response);
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn get(&self, url: &str) -> crate::errors::Result<HttpResponse> {
            self.requests.lock().unwrap().push(format!("GET {url}"));
            self.gets
                .get(url)
                .cloned()
                .ok_or_else(|| PipelineError::Transport {
                    url: url.to_string(),
                    message: "no scripted response".to_string(),
                })
        }

        async fn post(
            &self,
            url: &str,
            _headers: &[(String, String)],
            body: String,
        ) -> crate::errors::Result<HttpResponse> {
            self.requests.lock().unwrap().push(format!("POST {url}"));
            self.post_bodies.lock().unwrap().push(body);
            self.posts
                .get(url)
                .cloned()
                .ok_or_else(|| PipelineError::Transport {
                    url: url.to_string(),
                    message: "no scripted response".to_string(),
                })
        }
    }

    fn response(url: &str, content_type: &str, body: &[u8]) -> HttpResponse {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        HttpResponse {
            status: 200,
            headers,
            body: body.to_vec(),
            url: url.to_string(),
        }
    }

    fn pdf(url: &str, disposition: Option<&str>) -> HttpResponse {
        let mut out = response(url, "application/pdf", b"%PDF-1.7 fake");
        if let Some(disposition) = disposition {
            out.headers
                .insert("content-disposition".to_string(), disposition.to_string());
        }
        out
    }

    fn entry() -> DownloadInfo {
        DownloadInfo {
            source: "https://host.example/ViewDocuments.aspx?id=1".to_string(),
            doc_name: Some("Lead".to_string()),
        }
    }

    const ENTRY_URL: &str = "https://host.example/ViewDocuments.aspx?id=1";

    fn engine(transport: MockTransport) -> DownloadEngine<MockTransport> {
        DownloadEngine::new(transport, "service@firm.example")
    }

    #[tokio::test]
    async fn direct_pdf_uses_disposition_filename() {
        let transport = MockTransport::default().on_get(
            ENTRY_URL,
            pdf(ENTRY_URL, Some(r#"attachment; filename="motion.pdf""#)),
        );
        let docs = engine(transport).acquire(&entry()).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name.as_deref(), Some("motion.pdf"));
        assert_eq!(docs[0].bytes, b"%PDF-1.7 fake");
    }

    #[tokio::test]
    async fn octet_stream_without_disposition_is_unnamed_at_top_level() {
        let transport = MockTransport::default()
            .on_get(ENTRY_URL, response(ENTRY_URL, "application/octet-stream", b"raw"));
        let docs = engine(transport).acquire(&entry()).await.unwrap();
        assert_eq!(docs[0].name, None);
    }

    #[tokio::test]
    async fn verification_form_is_bypassed_then_document_returned() {
        let form_html = r#"
            <form action="/verify.aspx">
                <input name="__VIEWSTATE" value="vs" />
                <input name="__VIEWSTATEGENERATOR" value="gen" />
                <input name="__EVENTVALIDATION" value="ev" />
            </form>
        "#;
        let transport = MockTransport::default()
            .on_get(ENTRY_URL, response(ENTRY_URL, "text/html", form_html.as_bytes()))
            .on_post(
                "https://host.example/verify.aspx",
                pdf(
                    "https://host.example/verify.aspx",
                    Some("attachment; filename=order.pdf"),
                ),
            );
        let engine = engine(transport);
        let docs = engine.acquire(&entry()).await.unwrap();
        assert_eq!(docs[0].name.as_deref(), Some("order.pdf"));

        let bodies = engine.transport.post_bodies.lock().unwrap().clone();
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].contains("__VIEWSTATE=vs"));
        assert!(bodies[0].contains("emailAddress=service%40firm.example"));
        assert!(bodies[0].contains("username=service%40firm.example"));
        assert!(bodies[0].contains("SubmitEmailAddressButton=Validate"));
    }

    #[tokio::test]
    async fn bypass_with_missing_field_fails_before_posting() {
        let form_html = r#"
            <form action="/verify.aspx">
                <input name="__VIEWSTATE" value="vs" />
            </form>
        "#;
        let transport = MockTransport::default()
            .on_get(ENTRY_URL, response(ENTRY_URL, "text/html", form_html.as_bytes()));
        let engine = engine(transport);
        let err = engine.acquire(&entry()).await.unwrap_err();
        assert!(matches!(err, PipelineError::FormBypass { .. }));
        assert!(engine.transport.post_bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_page_fans_out_in_order_with_indexed_fallback_names() {
        let listing = r#"
            <a href="/docs/first?id=1">First Document</a>
            <a href="/docs/second?id=2">Second Document</a>
        "#;
        let transport = MockTransport::default()
            .on_get(ENTRY_URL, response(ENTRY_URL, "text/html", listing.as_bytes()))
            .on_get(
                "https://host.example/docs/first?id=1",
                pdf("https://host.example/docs/first?id=1", None),
            )
            .on_get(
                "https://host.example/docs/second?id=2",
                pdf("https://host.example/docs/second?id=2", None),
            );
        let engine = engine(transport);
        let docs = engine.acquire(&entry()).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name.as_deref(), Some("attachment_0"));
        assert_eq!(docs[1].name.as_deref(), Some("attachment_1"));

        let requests = engine.transport.requests();
        assert_eq!(
            requests,
            vec![
                format!("GET {ENTRY_URL}"),
                "GET https://host.example/docs/first?id=1".to_string(),
                "GET https://host.example/docs/second?id=2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn listing_page_without_candidates_fails() {
        let listing = r#"<a href="/viewstate?x=1">gate</a>"#;
        let transport = MockTransport::default()
            .on_get(ENTRY_URL, response(ENTRY_URL, "text/html", listing.as_bytes()));
        let err = engine(transport).acquire(&entry()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoLinksFound { .. }));
    }

    #[tokio::test]
    async fn unknown_content_type_fails() {
        let transport = MockTransport::default()
            .on_get(ENTRY_URL, response(ENTRY_URL, "text/plain", b"nope"));
        let err = engine(transport).acquire(&entry()).await.unwrap_err();
        match err {
            PipelineError::UnknownContentType { content_type, .. } => {
                assert_eq!(content_type, "text/plain")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn depth_two_fails_even_for_a_document_response() {
        // entry -> listing -> listing -> pdf forces depth 2.
        let listing_one = r#"<a href="/level/one?id=1">Level One Page</a>"#;
        let listing_two = r#"<a href="/level/two?id=2">Level Two Page</a>"#;
        let transport = MockTransport::default()
            .on_get(ENTRY_URL, response(ENTRY_URL, "text/html", listing_one.as_bytes()))
            .on_get(
                "https://host.example/level/one?id=1",
                response(
                    "https://host.example/level/one?id=1",
                    "text/html",
                    listing_two.as_bytes(),
                ),
            )
            .on_get(
                "https://host.example/level/two?id=2",
                pdf("https://host.example/level/two?id=2", None),
            );
        let err = engine(transport).acquire(&entry()).await.unwrap_err();
        match err {
            PipelineError::RecursionLimit { depth, .. } => assert_eq!(depth, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn non_success_status_is_a_transport_error() {
        let mut gated = response(ENTRY_URL, "text/html", b"");
        gated.status = 403;
        let transport = MockTransport::default().on_get(ENTRY_URL, gated);
        let err = engine(transport).acquire(&entry()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Transport { .. }));
    }
}
