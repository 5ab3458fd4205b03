//! Follows next-page links until a resource is exhausted.
//!
//! Failures never abort a fetch: the items gathered before the failure are
//! returned together with the reason paging stopped.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{Transport, resolve_link};

/// Decoded page body. Responses come in three shapes; anything else falls
/// back to [`Page::Unrecognised`], which carries no items and ends paging.
#[derive(Debug, Clone, PartialEq)]
pub enum Page {
    /// Bare JSON array; never has a next page.
    Raw(Vec<Value>),
    /// `{"items": [...], "meta": {"next": "..."}}`.
    Items { items: Vec<Value>, next: Option<String> },
    /// `{"data": [...], "next_page": {"uri": "..."}}`.
    Data { data: Vec<Value>, next: Option<String> },
    Unrecognised,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageBody {
    Raw(Vec<Value>),
    Items {
        items: Vec<Value>,
        #[serde(default)]
        meta: Option<PageMeta>,
    },
    Data {
        data: Vec<Value>,
        #[serde(default)]
        next_page: Option<NextPage>,
    },
}

#[derive(Deserialize)]
struct PageMeta {
    next: Option<String>,
}

#[derive(Deserialize)]
struct NextPage {
    uri: Option<String>,
    path: Option<String>,
}

impl Page {
    pub fn decode(value: Value) -> Self {
        match PageBody::deserialize(value) {
            Ok(PageBody::Raw(items)) => Page::Raw(items),
            Ok(PageBody::Items { items, meta }) => Page::Items {
                items,
                next: meta.and_then(|meta| meta.next).filter(|link| !link.is_empty()),
            },
            Ok(PageBody::Data { data, next_page }) => Page::Data {
                data,
                next: next_page
                    .and_then(|page| page.uri.or(page.path))
                    .filter(|link| !link.is_empty()),
            },
            Err(_) => Page::Unrecognised,
        }
    }

    /// Splits the page into its items and the optional next-page link.
    pub fn into_parts(self) -> (Vec<Value>, Option<String>) {
        match self {
            Page::Raw(items) => (items, None),
            Page::Items { items, next } => (items, next),
            Page::Data { data, next } => (data, next),
            Page::Unrecognised => (Vec::new(), None),
        }
    }
}

/// Why a paginated fetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The last page had no next link.
    Exhausted,
    /// The server answered with a non-success status.
    Status(u16),
    /// The request could not be completed.
    Transport(String),
    /// The body was not valid JSON.
    Undecodable(String),
    /// The body was JSON of an unknown shape.
    Unrecognised,
}

/// Items gathered by a paginated fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    pub items: Vec<Value>,
    pub pages: usize,
    pub stop: StopReason,
}

impl FetchReport {
    /// True when every page was read.
    pub fn is_complete(&self) -> bool {
        self.stop == StopReason::Exhausted
    }
}

/// Fetches `first_url` and every page linked after it, concatenating items
/// in page order.
pub fn fetch_pages<T: Transport + ?Sized>(transport: &T, first_url: String) -> FetchReport {
    let mut items = Vec::new();
    let mut pages = 0;
    let mut next = Some(first_url);

    while let Some(url) = next.take() {
        let reply = match transport.get(&url) {
            Ok(reply) => reply,
            Err(error) => {
                warn!(%url, %error, "request failed, keeping partial results");
                return FetchReport {
                    items,
                    pages,
                    stop: StopReason::Transport(error.to_string()),
                };
            }
        };

        if !reply.is_success() {
            warn!(%url, status = reply.status, body = %reply.body, "request rejected, keeping partial results");
            return FetchReport {
                items,
                pages,
                stop: StopReason::Status(reply.status),
            };
        }

        let value: Value = match serde_json::from_str(&reply.body) {
            Ok(value) => value,
            Err(error) => {
                warn!(%url, %error, "response body is not JSON, keeping partial results");
                return FetchReport {
                    items,
                    pages,
                    stop: StopReason::Undecodable(error.to_string()),
                };
            }
        };

        let page = Page::decode(value);
        if page == Page::Unrecognised {
            warn!(%url, "response has no item list, keeping partial results");
            return FetchReport {
                items,
                pages,
                stop: StopReason::Unrecognised,
            };
        }

        let (page_items, link) = page.into_parts();
        pages += 1;
        debug!(%url, page = pages, count = page_items.len(), "page fetched");
        items.extend(page_items);
        next = link.map(|link| resolve_link(transport.base_url(), &link));
    }

    FetchReport {
        items,
        pages,
        stop: StopReason::Exhausted,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::api::Reply;
    use crate::error::{ExtractError, Result};

    /// Serves canned replies keyed by absolute URL and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub base: String,
        pub replies: HashMap<String, Reply>,
        pub requests: RefCell<Vec<String>>,
    }

    impl ScriptedTransport {
        pub fn new(base: &str) -> Self {
            Self {
                base: base.to_string(),
                ..Self::default()
            }
        }

        pub fn json(mut self, url: &str, body: Value) -> Self {
            self.replies.insert(
                url.to_string(),
                Reply {
                    status: 200,
                    body: body.to_string(),
                },
            );
            self
        }

        pub fn status(mut self, url: &str, status: u16) -> Self {
            self.replies.insert(
                url.to_string(),
                Reply {
                    status,
                    body: "denied".to_string(),
                },
            );
            self
        }
    }

    impl Transport for ScriptedTransport {
        fn base_url(&self) -> &str {
            &self.base
        }

        fn get(&self, url: &str) -> Result<Reply> {
            self.requests.borrow_mut().push(url.to_string());
            self.replies
                .get(url)
                .cloned()
                .ok_or_else(|| ExtractError::Io(std::io::Error::other(format!("no reply for {url}"))))
        }
    }

    const BASE: &str = "https://api.example.com/v1";

    #[test]
    fn concatenates_pages_in_order_and_stops_without_link() {
        let transport = ScriptedTransport::new(BASE)
            .json(
                "https://api.example.com/v1/projects",
                json!({"items": [{"id": 1}, {"id": 2}], "meta": {"next": "/projects?page=2"}}),
            )
            .json(
                "https://api.example.com/v1/projects?page=2",
                json!({"items": [{"id": 3}], "meta": {"next": "https://api.example.com/v1/projects?page=3"}}),
            )
            .json(
                "https://api.example.com/v1/projects?page=3",
                json!({"items": [{"id": 4}], "meta": {}}),
            );

        let report = fetch_pages(&transport, format!("{BASE}/projects"));

        let ids: Vec<i64> = report.items.iter().filter_map(|item| item["id"].as_i64()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(report.pages, 3);
        assert!(report.is_complete());
        assert_eq!(transport.requests.borrow().len(), 3);
    }

    #[test]
    fn failure_status_keeps_partial_results() {
        let transport = ScriptedTransport::new(BASE)
            .json(
                "https://api.example.com/v1/financials",
                json!({"items": [{"id": "f1"}], "meta": {"next": "/financials?page=2"}}),
            )
            .status("https://api.example.com/v1/financials?page=2", 500);

        let report = fetch_pages(&transport, format!("{BASE}/financials"));

        assert_eq!(report.items, vec![json!({"id": "f1"})]);
        assert_eq!(report.stop, StopReason::Status(500));
        assert!(!report.is_complete());
    }

    #[test]
    fn transport_error_on_first_page_yields_nothing() {
        let transport = ScriptedTransport::new(BASE);
        let report = fetch_pages(&transport, format!("{BASE}/missing"));
        assert!(report.items.is_empty());
        assert_eq!(report.pages, 0);
        assert!(matches!(report.stop, StopReason::Transport(_)));
    }

    #[test]
    fn data_shape_follows_next_page_uri() {
        let transport = ScriptedTransport::new("https://tasks.example.com/api/1.0")
            .json(
                "https://tasks.example.com/api/1.0/portfolios/p/items",
                json!({
                    "data": [{"gid": "1"}],
                    "next_page": {"offset": "abc", "uri": "https://tasks.example.com/api/1.0/portfolios/p/items?offset=abc"}
                }),
            )
            .json(
                "https://tasks.example.com/api/1.0/portfolios/p/items?offset=abc",
                json!({"data": [{"gid": "2"}], "next_page": null}),
            );

        let report = fetch_pages(
            &transport,
            "https://tasks.example.com/api/1.0/portfolios/p/items".to_string(),
        );
        assert_eq!(report.items.len(), 2);
        assert!(report.is_complete());
    }

    #[test]
    fn decode_distinguishes_shapes() {
        assert_eq!(Page::decode(json!([1, 2])), Page::Raw(vec![json!(1), json!(2)]));
        assert_eq!(
            Page::decode(json!({"items": [], "meta": {"next": ""}})),
            Page::Items {
                items: vec![],
                next: None
            }
        );
        assert_eq!(Page::decode(json!({"error": "nope"})), Page::Unrecognised);
        assert_eq!(Page::decode(json!("text")), Page::Unrecognised);
    }

    #[test]
    fn unrecognised_and_invalid_bodies_stop_paging() {
        let transport = ScriptedTransport::new(BASE)
            .json("https://api.example.com/v1/a", json!({"message": "maintenance"}));
        let report = fetch_pages(&transport, format!("{BASE}/a"));
        assert_eq!(report.stop, StopReason::Unrecognised);

        let mut transport = ScriptedTransport::new(BASE);
        transport.replies.insert(
            "https://api.example.com/v1/b".to_string(),
            Reply {
                status: 200,
                body: "<html>".to_string(),
            },
        );
        let report = fetch_pages(&transport, format!("{BASE}/b"));
        assert!(matches!(report.stop, StopReason::Undecodable(_)));
    }
}
