//! Web worker entry point for cutout background removal.
//!
//! This crate compiles to a standalone WASM module that runs inside a
//! `Worker`. It receives image bytes and a `MatteConfig` via
//! `postMessage`, runs `cutout_core::remove_background`, and posts
//! `progress` events while it works followed by one `finished` or
//! `failed` event. A `ready` event announces that requests will be
//! heard. The layout of both directions is documented in
//! [`cutout_core::protocol`].
//!
//! Running the removal in a worker keeps the browser's main thread
//! free to paint the progress bar and react to the user.

use cutout_core::protocol::{self, WorkerEvent};
use cutout_core::{MatteConfig, remove_background};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// A decoded request from the main thread.
struct Request {
    image_bytes: Vec<u8>,
    config: MatteConfig,
    generation: f64,
}

/// Worker entry point, called when the WASM module is instantiated in
/// the worker context.
#[wasm_bindgen(start)]
pub fn worker_main() {
    console_error_panic_hook::set_once();

    let Ok(global) = js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>() else {
        web_sys::console::error_1(&"cutout-worker loaded outside a dedicated worker".into());
        return;
    };

    let onmessage =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            handle_message(&event.data());
        });
    global.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget(); // lives for the worker lifetime

    // Requests sent before this point were dropped; the main thread
    // waits for it.
    post_event(None, &WorkerEvent::Ready, None);
}

/// Run one request and post its events back.
fn handle_message(data: &JsValue) {
    let request = match read_request(data) {
        Ok(request) => request,
        Err((generation, message)) => {
            post_event(Some(generation), &WorkerEvent::Failed { message }, None);
            return;
        }
    };
    let generation = request.generation;

    // Synchronous; blocks this worker thread only.
    let mut last_percent = None;
    let outcome = remove_background(&request.image_bytes, &request.config, &mut |current, total| {
        // One message per whole percent keeps the channel quiet on
        // tall images.
        let percent = (total > 0).then(|| current.saturating_mul(100) / total);
        if percent != last_percent {
            last_percent = percent;
            post_event(Some(generation), &WorkerEvent::Progress { current, total }, None);
        }
    });

    match outcome {
        Ok(png) => post_event(Some(generation), &WorkerEvent::Finished, Some(&png)),
        Err(e) => post_event(
            Some(generation),
            &WorkerEvent::Failed {
                message: e.to_string(),
            },
            None,
        ),
    }
}

/// Extract the request fields. Errors carry the generation when it was
/// readable, so the failure still reaches the right run. A request
/// without one is answered with generation `-1`, which no run uses.
fn read_request(data: &JsValue) -> Result<Request, (f64, String)> {
    let get = |key: &str| js_sys::Reflect::get(data, &JsValue::from_str(key)).ok();

    let generation = get(protocol::GENERATION)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| (-1.0, String::from("missing generation field")))?;

    let image_bytes = get(protocol::IMAGE_BYTES)
        .and_then(|v| v.dyn_into::<js_sys::Uint8Array>().ok())
        .ok_or_else(|| (generation, String::from("imageBytes is not a Uint8Array")))?
        .to_vec();

    let config_json = get(protocol::CONFIG_JSON).and_then(|v| v.as_string());
    let config = protocol::decode_config(config_json.as_deref())
        .map_err(|e| (generation, format!("failed to parse config: {e}")))?;

    Ok(Request {
        image_bytes,
        config,
        generation,
    })
}

/// Post one event, with output bytes for `finished`. Events about the
/// worker itself carry no generation.
fn post_event(generation: Option<f64>, event: &WorkerEvent, output: Option<&[u8]>) {
    let event_json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            web_sys::console::error_1(&format!("failed to serialize worker event: {e}").into());
            return;
        }
    };

    let response = js_sys::Object::new();
    let set = |key: &str, val: &JsValue| {
        let _ = js_sys::Reflect::set(&response, &JsValue::from_str(key), val);
    };
    if let Some(generation) = generation {
        set(protocol::GENERATION, &JsValue::from_f64(generation));
    }
    set(protocol::EVENT_JSON, &JsValue::from_str(&event_json));
    if let Some(bytes) = output {
        set(protocol::OUTPUT_BYTES, &js_sys::Uint8Array::from(bytes));
    }

    if let Ok(global) = js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>() {
        let _ = global.post_message(&response);
    }
}
