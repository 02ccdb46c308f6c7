//! Positivity Tracker: a tiny web service tallying how positive (or negative)
//! its visitors feel.
//!
//! The interesting bits are the [`CounterStore`], which keeps named counters on
//! a flat-file [`DiskStore`], and the [`OptionPicker`], which hands out random
//! phrases. [`Tracker`] routes HTTP requests to both and is served by a small
//! thread-pooled HTTP/1.x [`Server`].

pub mod assets;
pub mod body;
pub mod config;
mod connection;
pub mod counter;
pub mod picker;
mod request;
mod response;
pub mod sentiment;
pub mod server;
pub mod store;
pub mod tracker;

use std::{
    error::Error,
    io::{self, BufReader, BufWriter, Write},
    sync::atomic::{AtomicBool, Ordering},
};

pub use body::Body;
pub use config::Config;
pub use connection::Connection;
pub use counter::{CounterError, CounterStore};
use headers::{HeaderMapExt, HeaderValue};
pub use http::{header, Method, Request, Response, StatusCode, Uri, Version};
pub use picker::{OptionPicker, PhraseError, Phrases};
pub use request::{ParseError, MAX_BODY_SIZE};
use response::Outcome;
pub use sentiment::Sentiment;
pub use server::{Server, ShutdownHandle};
pub use store::{DiskStore, KeyValueStore, MemoryStore, StoreError};
pub use tracker::Tracker;

type IncomingRequest = Request<Body>;

/// Maps [`Request`]s to [`Response`]s.
///
/// Usually you don't need to manually implement this trait, as its `Fn` implementation might suffice
/// most of the needs.
///
/// ```no_run
/// # use std::convert::Infallible;
/// # use positivity_tracker::{Body, Request, Response, Server, StatusCode};
/// fn app(_req: Request<Body>) -> Result<Response<&'static str>, Infallible> {
///     Ok(Response::builder().status(StatusCode::OK).body("hi").unwrap())
/// }
///
/// fn main() -> std::io::Result<()> {
///     Server::bind("localhost:9000")?.serve(app)
/// }
/// ```
pub trait App {
    type Body: Into<Body>;
    type Error: Into<Box<dyn Error + Send + Sync>>;

    fn handle(&self, request: IncomingRequest) -> Result<Response<Self::Body>, Self::Error>;
}

impl<F, B, Err> App for F
where
    F: Fn(IncomingRequest) -> Result<Response<B>, Err>,
    F: Sync + Send,
    F: Clone,
    B: Into<Body>,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    type Body = B;
    type Error = Err;

    fn handle(&self, request: IncomingRequest) -> Result<Response<Self::Body>, Self::Error> {
        self(request)
    }
}

pub(crate) fn serve<A: App>(conn: Connection, app: &A, shutdown: &AtomicBool) -> io::Result<()> {
    let mut reader = BufReader::new(conn.try_clone()?);
    let mut writer = BufWriter::new(conn);

    loop {
        match request::parse_request(&mut reader) {
            Ok(req) => {
                let asks_for_close = req
                    .headers()
                    .typed_get::<headers::Connection>()
                    .filter(|conn| conn.contains("close"))
                    .is_some();

                let asks_for_keep_alive = req
                    .headers()
                    .typed_get::<headers::Connection>()
                    .filter(|conn| conn.contains("keep-alive"))
                    .is_some();

                let version = req.version();

                let demands_close = match version {
                    Version::HTTP_09 => true,
                    Version::HTTP_10 => !asks_for_keep_alive,
                    _ => asks_for_close,
                };

                tracing::debug!(
                    method = %req.method(),
                    path = req.uri().path(),
                    "handling request"
                );

                let mut res: Response<Body> = app
                    .handle(req)
                    .map_err(io::Error::other)?
                    .map(Into::into);

                *res.version_mut() = version;

                // Draining: finish this response, then let the client go
                if demands_close || shutdown.load(Ordering::SeqCst) {
                    res.headers_mut()
                        .insert(header::CONNECTION, HeaderValue::from_static("close"));
                }

                match response::write_response(res, &mut writer)? {
                    Outcome::KeepAlive => writer.flush()?,
                    Outcome::Close => break,
                }
            }
            Err(ParseError::ConnectionClosed) => break,
            Err(err) if err.is_client_error() => {
                let mut res = Response::new(Body::from(format!("{err}\n")));
                *res.status_mut() = StatusCode::BAD_REQUEST;
                res.headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
                res.headers_mut().typed_insert(headers::ContentType::text_utf8());

                response::write_response(res, &mut writer)?;
                writer.flush()?;

                return Err(io::Error::new(io::ErrorKind::InvalidData, err));
            }
            Err(err) => return Err(io::Error::other(err)),
        }
    }

    writer.flush()
}
