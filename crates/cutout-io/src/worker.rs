//! Web worker communication for off-main-thread background removal.
//!
//! [`RemovalWorker`] wraps a `web_sys::Worker` running the
//! `cutout-worker` WASM module and implements [`Transform`], so the
//! workflow can await it like any other transformation. Image bytes go
//! out with a generation number; `progress` events are forwarded to the
//! caller's sink until a `finished` or `failed` event with the same
//! generation settles the run. See [`cutout_core::protocol`] for the
//! message layout.
//!
//! The worker is created from embedded JS + WASM blobs, so no extra
//! static files need to be served. A worker that cannot start (its
//! module fails to instantiate, or it never announces `ready`) settles
//! runs with [`WorkerError::Unavailable`] instead of leaving them
//! waiting.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use cutout_core::protocol::{self, WorkerEvent};
use cutout_core::{MatteConfig, OutputFormat, Transform};
use gloo_timers::callback::Timeout;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

/// How long a fresh worker may take to announce `ready`.
const STARTUP_TIMEOUT_MS: u32 = 15_000;

/// Errors from running a removal in the worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// A browser API call failed.
    #[error("browser API error: {0}")]
    JsError(String),

    /// The worker sent a reply that does not follow the protocol.
    #[error("malformed worker reply: {0}")]
    Protocol(String),

    /// The worker reported a failure.
    #[error("worker failed: {0}")]
    Failed(String),

    /// The run was abandoned before the worker replied.
    #[error("run abandoned")]
    Abandoned,

    /// The worker could not be started; nothing was processed.
    #[error("worker unavailable: {0}")]
    Unavailable(String),
}

impl From<JsValue> for WorkerError {
    fn from(value: JsValue) -> Self {
        Self::JsError(format!("{value:?}"))
    }
}

/// The worker's wasm-bindgen glue (`--target no-modules`) and WASM
/// binary, embedded by the app crate's build script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerAssets {
    /// JS glue defining the global `wasm_bindgen` initializer.
    pub glue: &'static str,
    /// The worker's WASM module.
    pub wasm: &'static [u8],
}

impl WorkerAssets {
    /// Whether both parts are present. Builds for targets other than
    /// `wasm32` embed empty placeholders.
    #[must_use]
    pub const fn is_built(&self) -> bool {
        !self.glue.is_empty() && !self.wasm.is_empty()
    }
}

type Reply = Result<(WorkerEvent, Option<Vec<u8>>), WorkerError>;

/// Replies received for the run in flight, and the wake-up for the
/// future waiting on them.
#[derive(Default)]
struct Inbox {
    events: VecDeque<Reply>,
    wake: Option<js_sys::Function>,
}

impl Inbox {
    fn push(&mut self, item: Reply) {
        self.events.push_back(item);
        if let Some(wake) = self.wake.take() {
            wake.call0(&JsValue::NULL).ok();
        }
    }
}

/// Start-up state of one worker instance.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Startup {
    Loading,
    Ready,
    Failed(String),
}

/// Routing between one worker instance and the run attached to it.
///
/// `R` is the request message. A request submitted while the worker is
/// still loading is held and handed back by [`ready`](Self::ready).
struct Link<R> {
    startup: Startup,
    held: Option<R>,
    run: Option<(u32, Rc<RefCell<Inbox>>)>,
}

impl<R> Link<R> {
    const fn new() -> Self {
        Self {
            startup: Startup::Loading,
            held: None,
            run: None,
        }
    }

    /// Attach a run. Returns the request when it can be posted now.
    fn submit(&mut self, generation: u32, inbox: Rc<RefCell<Inbox>>, request: R) -> Option<R> {
        self.held = None;
        match &self.startup {
            Startup::Failed(reason) => {
                self.run = None;
                inbox
                    .borrow_mut()
                    .push(Err(WorkerError::Unavailable(reason.clone())));
                None
            }
            Startup::Ready => {
                self.run = Some((generation, inbox));
                Some(request)
            }
            Startup::Loading => {
                self.run = Some((generation, inbox));
                self.held = Some(request);
                None
            }
        }
    }

    /// The worker announced `ready`. Returns the held request, if any.
    fn ready(&mut self) -> Option<R> {
        if self.startup != Startup::Loading {
            return None;
        }
        self.startup = Startup::Ready;
        self.held.take()
    }

    /// Start-up failed. The attached run settles with
    /// [`WorkerError::Unavailable`]. Ignored once the worker is ready.
    fn fail(&mut self, reason: String) {
        if self.startup != Startup::Loading {
            return;
        }
        self.held = None;
        if let Some((_, inbox)) = self.run.take() {
            inbox
                .borrow_mut()
                .push(Err(WorkerError::Unavailable(reason.clone())));
        }
        self.startup = Startup::Failed(reason);
    }

    /// An `error` event from the worker.
    fn on_error(&mut self, message: String) {
        match self.startup {
            Startup::Loading => self.fail(message),
            Startup::Ready => self.abort(WorkerError::JsError(message)),
            Startup::Failed(_) => {}
        }
    }

    /// Settle the attached run with `error`.
    fn abort(&mut self, error: WorkerError) {
        if let Some((_, inbox)) = self.run.take() {
            inbox.borrow_mut().push(Err(error));
        }
    }

    /// Hand a run reply to the attached run if the generations match.
    fn deliver(&self, generation: f64, reply: Reply) {
        if let Some((current, inbox)) = &self.run
            && (generation - f64::from(*current)).abs() < f64::EPSILON
        {
            inbox.borrow_mut().push(reply);
        }
    }

    /// Detach `inbox` if it is still the attached run.
    fn detach(&mut self, inbox: &Rc<RefCell<Inbox>>) {
        if self
            .run
            .as_ref()
            .is_some_and(|(_, current)| Rc::ptr_eq(current, inbox))
        {
            self.run = None;
            self.held = None;
        }
    }

    const fn has_failed(&self) -> bool {
        matches!(self.startup, Startup::Failed(_))
    }
}

/// One spawned worker with its handlers. Dropping it terminates the
/// worker.
struct Instance {
    worker: web_sys::Worker,
    link: Rc<RefCell<Link<js_sys::Object>>>,
    wasm_url: String,
    _onmessage: Closure<dyn FnMut(web_sys::MessageEvent)>,
    _onerror: Closure<dyn FnMut(web_sys::ErrorEvent)>,
    _startup_timeout: Timeout,
}

impl Instance {
    fn spawn(assets: WorkerAssets) -> Result<Self, WorkerError> {
        if !assets.is_built() {
            return Err(WorkerError::Unavailable(
                "worker module was not embedded in this build".into(),
            ));
        }
        let (worker, wasm_url) = create_worker(assets)?;
        let link = Rc::new(RefCell::new(Link::<js_sys::Object>::new()));

        let onmessage = {
            let link = Rc::clone(&link);
            let worker = worker.clone();
            Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
                match read_reply(&event.data()) {
                    (None, Ok((WorkerEvent::Ready, _))) => {
                        let held = link.borrow_mut().ready();
                        if let Some(request) = held
                            && let Err(e) = worker.post_message(&request)
                        {
                            link.borrow_mut().abort(e.into());
                        }
                    }
                    (None, Ok((WorkerEvent::Failed { message }, _))) => {
                        link.borrow_mut().fail(message);
                    }
                    (Some(generation), reply) => link.borrow().deliver(generation, reply),
                    (None, _) => {}
                }
            })
        };
        let onerror = {
            let link = Rc::clone(&link);
            Closure::<dyn FnMut(web_sys::ErrorEvent)>::new(move |event: web_sys::ErrorEvent| {
                link.borrow_mut().on_error(event.message());
            })
        };
        // Attached before control returns to the event loop, so no
        // start-up event is missed.
        worker.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        worker.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        let startup_timeout = {
            let link = Rc::downgrade(&link);
            Timeout::new(STARTUP_TIMEOUT_MS, move || {
                if let Some(link) = link.upgrade() {
                    link.borrow_mut().fail(format!(
                        "no ready signal within {} s",
                        STARTUP_TIMEOUT_MS / 1000
                    ));
                }
            })
        };

        Ok(Self {
            worker,
            link,
            wasm_url,
            _onmessage: onmessage,
            _onerror: onerror,
            _startup_timeout: startup_timeout,
        })
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.worker.set_onmessage(None);
        self.worker.set_onerror(None);
        self.worker.terminate();
        web_sys::Url::revoke_object_url(&self.wasm_url).ok();
    }
}

/// A background-removal worker.
///
/// Create one at app startup and reuse it for every run. Only one run
/// is served at a time: starting a new run, or calling
/// [`abandon`](Self::abandon), settles the previous one with
/// [`WorkerError::Abandoned`].
pub struct RemovalWorker {
    assets: WorkerAssets,
    config: MatteConfig,
    instance: RefCell<Option<Instance>>,
    generation: Cell<u32>,
    active: RefCell<Option<Rc<RefCell<Inbox>>>>,
}

impl RemovalWorker {
    /// Start a worker from the embedded glue and WASM.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Unavailable`] when `assets` are empty
    /// placeholders, or [`WorkerError::JsError`] if the browser refuses
    /// to create the worker. A worker that starts here may still fail
    /// to load; runs then settle with [`WorkerError::Unavailable`].
    pub fn new(assets: WorkerAssets, config: MatteConfig) -> Result<Self, WorkerError> {
        let instance = Instance::spawn(assets)?;
        Ok(Self {
            assets,
            config,
            instance: RefCell::new(Some(instance)),
            generation: Cell::new(0),
            active: RefCell::new(None),
        })
    }

    /// Drop the run in flight, if any.
    ///
    /// The worker is terminated and replaced so the abandoned
    /// computation stops using the CPU, and the waiting future settles
    /// with [`WorkerError::Abandoned`]. A worker that never started is
    /// left as is.
    pub fn abandon(&self) {
        let Some(inbox) = self.active.borrow_mut().take() else {
            return;
        };
        inbox.borrow_mut().push(Err(WorkerError::Abandoned));

        let mut instance = self.instance.borrow_mut();
        if instance
            .as_ref()
            .is_none_or(|current| current.link.borrow().has_failed())
        {
            return;
        }
        // Terminate before starting the replacement.
        *instance = None;
        match Instance::spawn(self.assets) {
            Ok(fresh) => *instance = Some(fresh),
            Err(e) => {
                web_sys::console::error_1(&format!("failed to restart worker: {e}").into());
            }
        }
    }

    /// Hand a request to the current instance, or settle `inbox` when
    /// there is nothing to hand it to.
    fn submit(&self, input: &[u8], generation: u32, inbox: &Rc<RefCell<Inbox>>) {
        let instance = self.instance.borrow();
        let Some(instance) = instance.as_ref() else {
            inbox.borrow_mut().push(Err(WorkerError::Unavailable(
                "worker could not be restarted".into(),
            )));
            return;
        };
        let request = match build_request(input, &self.config, generation) {
            Ok(request) => request,
            Err(e) => {
                inbox.borrow_mut().push(Err(e));
                return;
            }
        };
        let ready = instance
            .link
            .borrow_mut()
            .submit(generation, Rc::clone(inbox), request);
        if let Some(request) = ready
            && let Err(e) = instance.worker.post_message(&request)
        {
            inbox.borrow_mut().push(Err(e.into()));
        }
    }
}

impl Transform for RemovalWorker {
    type Error = WorkerError;

    #[allow(clippy::future_not_send)] // WASM is single-threaded; Send is not needed
    async fn run(
        &self,
        input: &[u8],
        output: OutputFormat,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Vec<u8>, WorkerError> {
        // Only PNG exists; the worker always encodes PNG.
        let OutputFormat::Png = output;

        self.abandon();
        let generation = self.generation.get().wrapping_add(1);
        self.generation.set(generation);

        let inbox = Rc::new(RefCell::new(Inbox::default()));
        *self.active.borrow_mut() = Some(Rc::clone(&inbox));
        self.submit(input, generation, &inbox);

        let outcome = loop {
            let next = inbox.borrow_mut().events.pop_front();
            match next {
                Some(Ok((WorkerEvent::Progress { current, total }, _))) => progress(current, total),
                Some(Ok((WorkerEvent::Finished, Some(bytes)))) => break Ok(bytes),
                Some(Ok((WorkerEvent::Finished, None))) => {
                    break Err(WorkerError::Protocol("finished without output bytes".into()));
                }
                Some(Ok((WorkerEvent::Failed { message }, _))) => {
                    break Err(WorkerError::Failed(message));
                }
                Some(Ok((WorkerEvent::Ready, _))) => {}
                Some(Err(e)) => break Err(e),
                None => {
                    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
                        inbox.borrow_mut().wake = Some(resolve);
                    });
                    if let Err(e) = JsFuture::from(promise).await {
                        break Err(e.into());
                    }
                }
            }
        };

        // A newer run may already own the worker.
        if self
            .active
            .borrow()
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, &inbox))
        {
            *self.active.borrow_mut() = None;
        }
        if let Some(instance) = self.instance.borrow().as_ref() {
            instance.link.borrow_mut().detach(&inbox);
        }

        outcome
    }
}

/// Build the request message for one run.
fn build_request(
    input: &[u8],
    config: &MatteConfig,
    generation: u32,
) -> Result<js_sys::Object, WorkerError> {
    let config_json = protocol::encode_config(config)
        .map_err(|e| WorkerError::Protocol(format!("failed to serialize config: {e}")))?;

    let message = js_sys::Object::new();
    js_sys::Reflect::set(
        &message,
        &JsValue::from_str(protocol::IMAGE_BYTES),
        &js_sys::Uint8Array::from(input),
    )?;
    js_sys::Reflect::set(
        &message,
        &JsValue::from_str(protocol::CONFIG_JSON),
        &JsValue::from_str(&config_json),
    )?;
    js_sys::Reflect::set(
        &message,
        &JsValue::from_str(protocol::GENERATION),
        &JsValue::from_f64(f64::from(generation)),
    )?;
    Ok(message)
}

/// Decode one reply into its generation (absent for worker-level
/// events) and its event.
fn read_reply(data: &JsValue) -> (Option<f64>, Reply) {
    let generation = js_sys::Reflect::get(data, &JsValue::from_str(protocol::GENERATION))
        .ok()
        .and_then(|v| v.as_f64());

    let Some(event_json) = js_sys::Reflect::get(data, &JsValue::from_str(protocol::EVENT_JSON))
        .ok()
        .and_then(|v| v.as_string())
    else {
        return (
            generation,
            Err(WorkerError::Protocol("reply missing eventJson".into())),
        );
    };
    let event = match serde_json::from_str::<WorkerEvent>(&event_json) {
        Ok(event) => event,
        Err(e) => return (generation, Err(WorkerError::Protocol(e.to_string()))),
    };

    let bytes = js_sys::Reflect::get(data, &JsValue::from_str(protocol::OUTPUT_BYTES))
        .ok()
        .and_then(|v| v.dyn_into::<js_sys::Uint8Array>().ok())
        .map(|array| array.to_vec());
    (generation, Ok((event, bytes)))
}

/// Create a web worker from the embedded glue and WASM. Returns the
/// worker and the WASM Blob URL, which must outlive the worker's
/// asynchronous initialization.
fn create_worker(assets: WorkerAssets) -> Result<(web_sys::Worker, String), WorkerError> {
    let wasm_array = js_sys::Uint8Array::from(assets.wasm);
    let wasm_parts = js_sys::Array::new();
    wasm_parts.push(&wasm_array.buffer());
    let wasm_opts = web_sys::BlobPropertyBag::new();
    wasm_opts.set_type("application/wasm");
    let wasm_blob =
        web_sys::Blob::new_with_buffer_source_sequence_and_options(&wasm_parts, &wasm_opts)?;
    let wasm_url = web_sys::Url::create_object_url_with_blob(&wasm_blob)?;

    // Instantiation failures are reported as a generation-less `failed`
    // event, which the main thread treats as "worker unavailable".
    let glue = assets.glue;
    let event_json = protocol::EVENT_JSON;
    let wrapper_js = format!(
        r#"{glue}

wasm_bindgen("{wasm_url}").catch(function (e) {{
    self.postMessage({{
        {event_json}: JSON.stringify({{ kind: "failed", message: "worker init failed: " + e }})
    }});
}});
"#
    );

    let js_parts = js_sys::Array::new();
    js_parts.push(&JsValue::from_str(&wrapper_js));
    let js_opts = web_sys::BlobPropertyBag::new();
    js_opts.set_type("application/javascript");
    let js_blob = web_sys::Blob::new_with_str_sequence_and_options(&js_parts, &js_opts)?;
    let js_url = web_sys::Url::create_object_url_with_blob(&js_blob)?;

    let worker = web_sys::Worker::new(&js_url);

    // The worker has fetched its script once constructed.
    web_sys::Url::revoke_object_url(&js_url).ok();

    match worker {
        Ok(worker) => Ok((worker, wasm_url)),
        Err(e) => {
            web_sys::Url::revoke_object_url(&wasm_url).ok();
            Err(e.into())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn inbox() -> Rc<RefCell<Inbox>> {
        Rc::new(RefCell::new(Inbox::default()))
    }

    fn drain(inbox: &Rc<RefCell<Inbox>>) -> Vec<Reply> {
        inbox.borrow_mut().events.drain(..).collect()
    }

    #[test]
    fn request_is_held_until_ready() {
        let mut link = Link::new();
        let run = inbox();
        assert_eq!(link.submit(1, Rc::clone(&run), "req"), None);
        assert_eq!(link.ready(), Some("req"));
        assert_eq!(link.ready(), None);
        assert!(drain(&run).is_empty());
    }

    #[test]
    fn ready_worker_posts_immediately() {
        let mut link = Link::new();
        assert_eq!(link.ready(), None);
        assert_eq!(link.submit(1, inbox(), "req"), Some("req"));
    }

    #[test]
    fn load_failure_settles_the_waiting_run() {
        let mut link = Link::new();
        let run = inbox();
        assert_eq!(link.submit(1, Rc::clone(&run), "req"), None);

        link.on_error("importScripts failed".into());
        assert_eq!(
            drain(&run),
            vec![Err(WorkerError::Unavailable("importScripts failed".into()))]
        );

        // A late ready does not resurrect the held request.
        assert_eq!(link.ready(), None);

        // Later runs settle at once instead of waiting.
        let next = inbox();
        assert_eq!(link.submit(2, Rc::clone(&next), "again"), None);
        assert!(matches!(
            drain(&next).as_slice(),
            [Err(WorkerError::Unavailable(_))]
        ));
    }

    #[test]
    fn startup_timeout_after_ready_is_ignored() {
        let mut link = Link::new();
        link.ready();
        link.fail("no ready signal".into());
        assert_eq!(link.submit(1, inbox(), "req"), Some("req"));
    }

    #[test]
    fn error_after_ready_fails_the_run() {
        let mut link = Link::new();
        link.ready();
        let run = inbox();
        link.submit(4, Rc::clone(&run), "req");
        link.on_error("panicked".into());
        assert_eq!(drain(&run), vec![Err(WorkerError::JsError("panicked".into()))]);
    }

    #[test]
    fn replies_for_other_generations_are_dropped() {
        let mut link = Link::new();
        link.ready();
        let run = inbox();
        link.submit(2, Rc::clone(&run), "req");

        link.deliver(1.0, Ok((WorkerEvent::Finished, Some(vec![1]))));
        assert!(drain(&run).is_empty());

        link.deliver(2.0, Ok((WorkerEvent::Progress { current: 1, total: 4 }, None)));
        assert_eq!(
            drain(&run),
            vec![Ok((WorkerEvent::Progress { current: 1, total: 4 }, None))]
        );
    }

    #[test]
    fn detach_only_releases_its_own_run() {
        let mut link = Link::new();
        let old = inbox();
        let new = inbox();
        link.submit(1, Rc::clone(&old), "old");
        link.submit(2, Rc::clone(&new), "new");

        link.detach(&old);
        assert_eq!(link.ready(), Some("new"));

        link.detach(&new);
        link.deliver(2.0, Ok((WorkerEvent::Finished, Some(vec![]))));
        assert!(drain(&new).is_empty());
    }

    #[test]
    fn placeholder_assets_are_not_built() {
        let empty = WorkerAssets { glue: "", wasm: &[] };
        assert!(!empty.is_built());
        assert!(WorkerAssets { glue: "x", wasm: &[0] }.is_built());
    }
}
