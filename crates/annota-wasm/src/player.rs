//! YouTube IFrame player adapter
//!
//! The IFrame API script is injected once per page. Its global
//! `onYouTubeIframeAPIReady` hook resolves a shared promise, so every
//! player created afterwards awaits the same load.

use crate::log;
use annota_core::{
    millis_to_seconds, seconds_to_millis, Error, MediaRef, PlaybackState, Player, WidgetConfig,
};
use js_sys::{Function, Object, Promise, Reflect};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{HtmlScriptElement, Window};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = YT, js_name = Player)]
    type YtPlayer;

    #[wasm_bindgen(constructor, js_namespace = YT, js_class = "Player")]
    fn new(element_id: &str, options: &JsValue) -> YtPlayer;

    #[wasm_bindgen(method, js_class = "Player", js_name = getCurrentTime)]
    fn get_current_time(this: &YtPlayer) -> f64;

    #[wasm_bindgen(method, js_class = "Player", js_name = seekTo)]
    fn seek_to(this: &YtPlayer, seconds: f64, allow_seek_ahead: bool);
}

thread_local! {
    static API_READY: RefCell<Option<Promise>> = const { RefCell::new(None) };
}

fn unavailable(reason: &str) -> JsValue {
    JsValue::from_str(&Error::PlayerUnavailable(reason.to_string()).to_string())
}

fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| unavailable("no global window"))
}

fn api_present(window: &Window) -> bool {
    Reflect::get(window, &"YT".into())
        .and_then(|yt| Reflect::get(&yt, &"Player".into()))
        .map(|player| player.is_function())
        .unwrap_or(false)
}

/// Promise resolved once the IFrame API is usable
fn load_api(script_url: &str) -> Result<Promise, JsValue> {
    if let Some(ready) = API_READY.with(|ready| ready.borrow().clone()) {
        return Ok(ready);
    }

    let window = window()?;
    let ready = if api_present(&window) {
        Promise::resolve(&JsValue::UNDEFINED)
    } else {
        let ready = Promise::new(&mut |resolve, _reject| {
            let hook = Closure::once_into_js(move || {
                let _ = resolve.call0(&JsValue::NULL);
            });
            let _ = Reflect::set(&window, &"onYouTubeIframeAPIReady".into(), &hook);
        });

        let document = window
            .document()
            .ok_or_else(|| unavailable("no document"))?;
        let script: HtmlScriptElement = document.create_element("script")?.dyn_into()?;
        script.set_src(script_url);
        script.set_async(true);
        document
            .head()
            .ok_or_else(|| unavailable("document has no <head>"))?
            .append_child(&script)?;
        log::info(&format!("Loading player API from {script_url}"));
        ready
    };

    API_READY.with(|cached| *cached.borrow_mut() = Some(ready.clone()));
    Ok(ready)
}

#[derive(Default)]
struct StateHook {
    last: Cell<Option<PlaybackState>>,
    handler: RefCell<Option<Function>>,
}

impl StateHook {
    fn fire(&self, state: PlaybackState) {
        self.last.set(Some(state));
        if let Some(handler) = self.handler.borrow().as_ref() {
            if let Err(err) = handler.call1(&JsValue::NULL, &JsValue::from(state.code())) {
                log::warn(&format!("state change handler threw: {err:?}"));
            }
        }
    }
}

/// Ready YouTube player embedded in the page
pub struct YouTubePlayer {
    inner: YtPlayer,
    hook: Rc<StateHook>,
    _on_state_change: Closure<dyn FnMut(JsValue)>,
}

impl YouTubePlayer {
    /// Load the API if needed, embed the player in `media.container_id`
    /// and wait for its ready event.
    pub async fn create(config: &WidgetConfig, media: &MediaRef) -> Result<Self, JsValue> {
        JsFuture::from(load_api(&config.player_script_url)?).await?;

        let hook = Rc::new(StateHook::default());
        let state_hook = Rc::clone(&hook);
        let on_state_change = Closure::<dyn FnMut(JsValue)>::new(move |event: JsValue| {
            let code = Reflect::get(&event, &"data".into())
                .ok()
                .and_then(|data| data.as_f64());
            match code.and_then(|code| PlaybackState::from_code(code as i32)) {
                Some(state) => state_hook.fire(state),
                None => log::warn(&format!("unknown player state {code:?}")),
            }
        });

        let mut on_ready = JsValue::UNDEFINED;
        let ready = Promise::new(&mut |resolve, _reject| {
            on_ready = Closure::once_into_js(move |_event: JsValue| {
                let _ = resolve.call0(&JsValue::NULL);
            });
        });

        let events = Object::new();
        Reflect::set(&events, &"onReady".into(), &on_ready)?;
        Reflect::set(&events, &"onStateChange".into(), on_state_change.as_ref())?;

        let options = Object::new();
        Reflect::set(&options, &"height".into(), &JsValue::from(config.player_height))?;
        Reflect::set(&options, &"width".into(), &JsValue::from(config.player_width))?;
        Reflect::set(&options, &"videoId".into(), &JsValue::from_str(&media.player_media_id))?;
        Reflect::set(&options, &"events".into(), &events)?;

        let inner = YtPlayer::new(&media.container_id, &options);
        JsFuture::from(ready).await?;
        log::info(&format!("Player ready for {}", media.player_media_id));

        Ok(Self {
            inner,
            hook,
            _on_state_change: on_state_change,
        })
    }

    /// Register a JS handler called with the numeric state on every change
    pub fn set_state_handler(&self, handler: Option<Function>) {
        *self.hook.handler.borrow_mut() = handler;
    }

    /// Last reported playback state
    pub fn state(&self) -> Option<PlaybackState> {
        self.hook.last.get()
    }
}

impl Player for YouTubePlayer {
    fn current_time_millis(&self) -> u64 {
        seconds_to_millis(self.inner.get_current_time())
    }

    fn seek_to(&self, millis: u64) {
        self.inner.seek_to(millis_to_seconds(millis), true);
    }

    fn on_state_change(&self, state: PlaybackState) {
        self.hook.fire(state);
    }
}
