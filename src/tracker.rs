use std::{convert::Infallible, sync::Arc};

use headers::HeaderMapExt;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};

use crate::{
    assets, body::Body, counter::CounterStore, picker::OptionPicker, store::KeyValueStore, App,
    Sentiment,
};

/// The positivity tracker web app.
///
/// Cheap to clone; every clone shares the same counters and phrases.
pub struct Tracker<S> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    counters: CounterStore<S>,
    picker: OptionPicker,
}

impl<S> Clone for Tracker<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

enum Route {
    Home,
    Asset(String),
    Option(Sentiment),
    Counter(Sentiment),
}

impl Route {
    fn from_path(path: &str) -> Option<Self> {
        if path == "/" {
            return Some(Route::Home);
        }
        if let Some(asset) = path.strip_prefix("/www/") {
            return Some(Route::Asset(asset.to_owned()));
        }
        if let Some(sentiment) = path.strip_prefix("/option/") {
            return sentiment.parse().ok().map(Route::Option);
        }
        path.strip_prefix('/')
            .and_then(|sentiment| sentiment.parse().ok())
            .map(Route::Counter)
    }

    fn allows(&self, method: &Method) -> bool {
        match self {
            Route::Counter(_) => method == Method::GET || method == Method::POST,
            _ => method == Method::GET,
        }
    }

    fn allow_header(&self) -> &'static str {
        match self {
            Route::Counter(_) => "GET, POST",
            _ => "GET",
        }
    }
}

impl<S: KeyValueStore> Tracker<S> {
    pub fn new(store: S, picker: OptionPicker) -> Self {
        Self {
            inner: Arc::new(Inner {
                counters: CounterStore::new(store),
                picker,
            }),
        }
    }

    pub fn picker(&self) -> &OptionPicker {
        &self.inner.picker
    }

    fn route(&self, method: &Method, route: Route) -> Response<Body> {
        match (method, route) {
            (_, Route::Home) => html(assets::HOME_PAGE),
            (_, Route::Asset(path)) => match assets::lookup(&path) {
                Some(asset) => {
                    let mut res = Response::new(Body::from(asset.content));
                    res.headers_mut().insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static(asset.content_type),
                    );
                    res
                }
                None => not_found(),
            },
            (_, Route::Option(sentiment)) => text(self.inner.picker.random(sentiment).to_owned()),
            (&Method::POST, Route::Counter(sentiment)) => {
                text(self.inner.counters.increment(sentiment.key()))
            }
            (_, Route::Counter(sentiment)) => text(self.inner.counters.get(sentiment.key())),
        }
    }
}

impl<S: KeyValueStore> App for Tracker<S> {
    type Body = Body;
    type Error = Infallible;

    fn handle(&self, req: Request<Body>) -> Result<Response<Body>, Self::Error> {
        let method = req.method();

        let res = match Route::from_path(req.uri().path()) {
            Some(route) if route.allows(method) => self.route(method, route),
            Some(route) => {
                let mut res = text("Method Not Allowed");
                *res.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
                res.headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static(route.allow_header()));
                res
            }
            None => not_found(),
        };

        Ok(res)
    }
}

fn text(body: impl Into<Body>) -> Response<Body> {
    let mut res = Response::new(body.into());
    res.headers_mut()
        .typed_insert(headers::ContentType::text_utf8());
    res
}

fn html(body: &'static str) -> Response<Body> {
    let mut res = Response::new(Body::from(body));
    res.headers_mut().typed_insert(headers::ContentType::html());
    res
}

fn not_found() -> Response<Body> {
    let mut res = text("Not Found");
    *res.status_mut() = StatusCode::NOT_FOUND;
    res
}
