use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use glam::Vec2;
use instant::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

#[cfg(target_arch = "wasm32")]
use js_sys::Promise;
#[cfg(target_arch = "wasm32")]
use once_cell::sync::OnceCell;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen_futures::future_to_promise;

mod app_state;
mod color;
pub mod field;
mod models;
mod ui_events;
mod viewport;

use app_state::State;
pub use field::params::{FieldParams, NodeBudget, Palette};
pub use field::{LinkSegment, ParticleField};
pub use ui_events::{FieldRole, UserCommand};
pub use viewport::{SizePolicy, Viewport};

/// Host-page canvas ids, one per instance.
#[cfg(target_arch = "wasm32")]
const BACKDROP_CANVAS_ID: &str = "bg-web";
#[cfg(target_arch = "wasm32")]
const PORTRAIT_CANVAS_ID: &str = "portrait-web";

#[cfg(target_arch = "wasm32")]
static WASM_API_INSTANCE: OnceCell<WasmApi> = OnceCell::new();

#[cfg(target_arch = "wasm32")]
static WASM_READY_FLUME_CHANNEL: OnceCell<(flume::Sender<()>, flume::Receiver<()>)> =
    OnceCell::new();

/// One renderer instance: its window (canvas) and its own State. The two
/// instances never share state.
struct Instance {
    role: FieldRole,
    window: Arc<Window>,
    // Wrapped in Arc<Mutex> for interior mutability across the WASM async init task.
    state: Arc<Mutex<Option<State>>>,
}

struct App {
    instances: HashMap<WindowId, Instance>,
    #[cfg(target_arch = "wasm32")]
    proxy: Option<EventLoopProxy<UserCommand>>,
    /// Instances whose async init has not settled yet; the ready promise
    /// resolves when this reaches zero.
    #[cfg(target_arch = "wasm32")]
    pending_init: usize,
}

impl App {
    fn new(#[cfg(target_arch = "wasm32")] event_loop: &EventLoop<UserCommand>) -> Self {
        #[cfg(target_arch = "wasm32")]
        let app_proxy = event_loop.create_proxy();

        #[cfg(target_arch = "wasm32")]
        {
            let wasm_api_instance = WasmApi {
                proxy: app_proxy.clone(),
            };
            if WASM_API_INSTANCE.set(wasm_api_instance).is_err() {
                log::warn!("WASM_API_INSTANCE was already set. This should only happen once.");
            }
        }

        Self {
            instances: HashMap::new(),
            #[cfg(target_arch = "wasm32")]
            proxy: Some(app_proxy),
            #[cfg(target_arch = "wasm32")]
            pending_init: 0,
        }
    }

    fn instance_by_role(&self, role: FieldRole) -> Option<&Instance> {
        self.instances.values().find(|instance| instance.role == role)
    }

    fn spawn_instance(&mut self, event_loop: &ActiveEventLoop, role: FieldRole) {
        let (params, policy) = role_config(role);

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title(match role {
            FieldRole::Backdrop => "webdrift backdrop",
            FieldRole::Portrait => "webdrift portrait",
        });

        #[cfg(not(target_arch = "wasm32"))]
        {
            window_attributes = window_attributes.with_inner_size(match role {
                FieldRole::Backdrop => LogicalSize::new(960.0, 600.0),
                FieldRole::Portrait => LogicalSize::new(320.0, 420.0),
            });
        }

        #[cfg(target_arch = "wasm32")]
        let window_attributes = {
            use winit::platform::web::WindowAttributesExtWebSys;

            let canvas_id = match role {
                FieldRole::Backdrop => BACKDROP_CANVAS_ID,
                FieldRole::Portrait => PORTRAIT_CANVAS_ID,
            };
            // A page without this canvas simply doesn't get this field.
            let Some(canvas) = lookup_canvas(canvas_id) else {
                log::warn!("Canvas #{} not present; {:?} field stays off.", canvas_id, role);
                return;
            };
            window_attributes.with_canvas(Some(canvas))
        };

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::warn!("Could not create a window for {:?}: {:?}", role, e);
                return;
            }
        };

        let state_slot: Arc<Mutex<Option<State>>> = Arc::new(Mutex::new(None));

        #[cfg(not(target_arch = "wasm32"))]
        {
            let size = window.inner_size().to_logical::<f32>(window.scale_factor());
            let initial_box = Vec2::new(size.width, size.height);
            match pollster::block_on(State::new(window.clone(), params, policy, initial_box)) {
                Ok(state) => {
                    state_slot.lock().unwrap().replace(state);
                    window.request_redraw();
                }
                Err(e) => {
                    log::warn!("Renderer for {:?} failed to start: {:?}", role, e);
                    return;
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            self.pending_init += 1;
            let state_slot_for_spawn = state_slot.clone();
            let window_for_state = window.clone();
            let proxy_for_init = self.proxy.as_ref().expect("App proxy not set").clone();

            wasm_bindgen_futures::spawn_local(async move {
                let initial_box = match role {
                    FieldRole::Portrait => parent_box(PORTRAIT_CANVAS_ID),
                    FieldRole::Backdrop => None,
                }
                .unwrap_or_else(|| {
                    let size = window_for_state
                        .inner_size()
                        .to_logical::<f32>(window_for_state.scale_factor());
                    Vec2::new(size.width, size.height)
                });

                match State::new(window_for_state.clone(), params, policy, initial_box).await {
                    Ok(state) => {
                        log::info!("{:?} state created in async task.", role);
                        if role == FieldRole::Portrait {
                            let logical = state.viewport.logical_size();
                            let _ = window_for_state
                                .request_inner_size(LogicalSize::new(logical.x, logical.y));
                        }
                        state_slot_for_spawn.lock().unwrap().replace(state);
                    }
                    Err(e) => log::error!("Failed to create {:?} state in WASM: {:?}", role, e),
                }
                // Settles the ready count whether init worked or not.
                if proxy_for_init
                    .send_event(UserCommand::StateInitialized(role))
                    .is_err()
                {
                    log::error!("Failed to send StateInitialized event.");
                }
            });

            if role == FieldRole::Portrait {
                if let Some(proxy) = self.proxy.as_ref() {
                    observe_parent_box(PORTRAIT_CANVAS_ID, proxy.clone());
                }
            }
        }

        self.instances.insert(
            window.id(),
            Instance {
                role,
                window,
                state: state_slot,
            },
        );
    }
}

fn role_config(role: FieldRole) -> (FieldParams, SizePolicy) {
    match role {
        FieldRole::Backdrop => (FieldParams::backdrop(), SizePolicy::Window),
        FieldRole::Portrait => (FieldParams::portrait(), SizePolicy::portrait()),
    }
}

/// The box a resize should be measured against. The portrait instance on the
/// web follows its parent element, not the canvas itself.
fn measure_box(instance: &Instance, size: winit::dpi::PhysicalSize<u32>) -> Vec2 {
    #[cfg(target_arch = "wasm32")]
    if instance.role == FieldRole::Portrait {
        if let Some(parent) = parent_box(PORTRAIT_CANVAS_ID) {
            return parent;
        }
    }

    let logical = size.to_logical::<f32>(instance.window.scale_factor());
    Vec2::new(logical.width, logical.height)
}

impl ApplicationHandler<UserCommand> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.instances.is_empty() {
            return;
        }

        self.spawn_instance(event_loop, FieldRole::Backdrop);
        self.spawn_instance(event_loop, FieldRole::Portrait);

        #[cfg(target_arch = "wasm32")]
        if self.pending_init == 0 {
            // Nothing could start; resolve the ready promise anyway.
            signal_ready();
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserCommand) {
        match event {
            UserCommand::StateInitialized(role) => {
                log::info!("{:?} instance ready.", role);
                #[cfg(target_arch = "wasm32")]
                {
                    self.pending_init = self.pending_init.saturating_sub(1);
                    if self.pending_init == 0 {
                        signal_ready();
                    }
                }
                if let Some(instance) = self.instance_by_role(role) {
                    instance.window.request_redraw();
                }
            }
            UserCommand::ParentBoxResized { width, height } => {
                let Some(instance) = self.instance_by_role(FieldRole::Portrait) else {
                    return;
                };
                let mut state_guard = instance.state.lock().unwrap();
                let Some(state) = state_guard.as_mut() else {
                    // Init will measure the parent box itself.
                    return;
                };
                state.resize(Vec2::new(width, height));
                let logical = state.viewport.logical_size();
                let _ = instance
                    .window
                    .request_inner_size(LogicalSize::new(logical.x, logical.y));
                instance.window.request_redraw();
            }
            UserCommand::SetPalette(_) => {
                for instance in self.instances.values() {
                    if let Some(state) = instance.state.lock().unwrap().as_mut() {
                        state.process_command(&event);
                        instance.window.request_redraw();
                    }
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(instance) = self.instances.get(&window_id) else {
            return;
        };
        let mut state_guard = instance.state.lock().unwrap();
        let Some(state) = state_guard.as_mut() else {
            log::warn!("Window event received before State was initialized, ignoring.");
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                let box_size = measure_box(instance, size);
                state.resize(box_size);
                instance.window.request_redraw();
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                state.set_scale_factor(scale_factor);
                instance.window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                // Skipped frames mutate nothing and draw nothing.
                if state.update(Instant::now()) {
                    match state.render() {
                        Ok(()) => {}
                        Err(wgpu::SurfaceError::Lost) => state.reconfigure_surface(),
                        Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                        Err(e) => log::error!("{:?}", e),
                    }
                }
                // Continuous animation: always queue the next repaint.
                instance.window.request_redraw();
            }
            WindowEvent::CursorMoved { position, .. } => {
                if instance.role == FieldRole::Backdrop {
                    let scale = instance.window.scale_factor();
                    state.pointer = Some(Vec2::new(
                        (position.x / scale) as f32,
                        (position.y / scale) as f32,
                    ));
                }
            }
            WindowEvent::CursorLeft { .. } => {
                state.pointer = None;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::KeyR),
                        state: key_state,
                        repeat,
                        ..
                    },
                ..
            } => {
                if key_state.is_pressed() && !repeat {
                    log::info!("FPS: {}", state.current_fps);
                }
            }
            _ => {}
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            console_error_panic_hook::set_once();
            console_log::init_with_level(log::Level::Info).unwrap_throw();
            log::info!("Starting webdrift.");
            let (sender, receiver) = flume::unbounded();
            WASM_READY_FLUME_CHANNEL
                .set((sender, receiver))
                .expect("Failed to initialize WASM_READY_CHANNEL. This should not happen.");
            log::info!("WASM ready channel created and stored.");
        } else {
            env_logger::init();
        }
    }

    let event_loop = EventLoop::with_user_event().build()?;
    let mut app = App::new(
        #[cfg(target_arch = "wasm32")]
        &event_loop,
    );
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn lookup_canvas(canvas_id: &str) -> Option<web_sys::HtmlCanvasElement> {
    use wasm_bindgen::JsCast;
    let document = web_sys::window()?.document()?;
    let element = document.get_element_by_id(canvas_id)?;
    element.dyn_into::<web_sys::HtmlCanvasElement>().ok()
}

/// Bounding box of the portrait canvas's parent element, in logical px.
#[cfg(target_arch = "wasm32")]
fn parent_box(canvas_id: &str) -> Option<Vec2> {
    let document = web_sys::window()?.document()?;
    let parent = document.get_element_by_id(canvas_id)?.parent_element()?;
    let rect = parent.get_bounding_client_rect();
    Some(Vec2::new(rect.width() as f32, rect.height() as f32))
}

/// Watch the portrait container for size changes that are not window
/// resizes (font loading, responsive reflow) and forward them into the
/// event loop.
#[cfg(target_arch = "wasm32")]
fn observe_parent_box(canvas_id: &str, proxy: EventLoopProxy<UserCommand>) {
    use wasm_bindgen::JsCast;
    use wasm_bindgen::closure::Closure;

    let Some(parent) = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(canvas_id))
        .and_then(|c| c.parent_element())
    else {
        return;
    };

    let callback = Closure::<dyn FnMut(js_sys::Array)>::new(move |entries: js_sys::Array| {
        let Ok(entry) = entries.get(0).dyn_into::<web_sys::ResizeObserverEntry>() else {
            return;
        };
        let rect = entry.content_rect();
        let _ = proxy.send_event(UserCommand::ParentBoxResized {
            width: rect.width() as f32,
            height: rect.height() as f32,
        });
    });

    match web_sys::ResizeObserver::new(callback.as_ref().unchecked_ref()) {
        Ok(observer) => {
            observer.observe(&parent);
            // Both live for the page lifetime; there is no teardown path.
            callback.forget();
            std::mem::forget(observer);
        }
        Err(e) => log::warn!("ResizeObserver unavailable: {:?}", e),
    }
}

#[cfg(target_arch = "wasm32")]
fn signal_ready() {
    if let Some((sender, _)) = WASM_READY_FLUME_CHANNEL.get() {
        if let Err(e) = sender.send(()) {
            log::error!("Failed to send WASM ready signal: {:?}", e);
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    log::info!("WASM started: Calling run().");
    run().unwrap_throw();

    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
#[derive(Clone, Debug)]
pub struct WasmApi {
    proxy: EventLoopProxy<UserCommand>,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl WasmApi {
    /// Re-theme both canvases; the page calls this from its theme toggle.
    #[wasm_bindgen(js_name = setPalette)]
    pub fn set_palette(&self, palette_json: &str) -> Result<(), JsValue> {
        let palette: Palette = serde_json::from_str(palette_json)
            .map_err(|e| JsValue::from_str(&format!("JSON parsing error: {}", e)))?;

        log::info!("Received SetPalette command from JS.");

        if self
            .proxy
            .send_event(UserCommand::SetPalette(palette))
            .is_err()
        {
            return Err(JsValue::from_str("Failed to send command to event loop."));
        }
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getWasmApi)]
pub fn get_wasm_api() -> Result<WasmApi, JsValue> {
    WASM_API_INSTANCE
        .get()
        .cloned()
        .ok_or_else(|| JsValue::from_str("WasmApi is not initialized. Call run_web() first."))
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getWasmReadyPromise)]
pub fn get_wasm_ready_promise() -> Result<Promise, JsValue> {
    let (_, receiver) = WASM_READY_FLUME_CHANNEL.get().ok_or_else(|| {
        JsValue::from_str("WASM ready channel not initialized. Call run_web() first.")
    })?;

    let receiver = receiver.clone();
    let ready_promise = future_to_promise(async move {
        receiver.recv_async().await.unwrap_throw(); // Wait for the signal
        Ok(JsValue::NULL) // Resolve with null
    });

    Ok(ready_promise)
}
