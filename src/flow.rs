//! Window, event loop and frame scheduling.
//!
//! The [`App`] creates the window on `resumed`, builds the GPU [`Context`]
//! and the [`Landscape`], then kicks off one background load per external
//! model. Finished loads come back through the event loop proxy as
//! [`AppEvent::AssetLoaded`] and are grafted into the scene on the event loop
//! thread. Every redraw ticks the landscape, renders and requests the next
//! frame.

use std::sync::Arc;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::UnwrapThrowExt;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::Window,
};

use crate::{
    config::LandscapeConfig,
    context::Context,
    data_structures::scene_graph::Node,
    landscape::{
        Landscape,
        assets::{AssetKind, AssetRequest},
    },
};

const WINDOW_TITLE: &str = "Valley";

pub enum AppEvent {
    /// Sent by the wasm init future once the GPU is ready.
    Initialized { ctx: Context, landscape: Landscape },
    AssetLoaded {
        kind: AssetKind,
        result: anyhow::Result<Node>,
    },
}

impl std::fmt::Debug for AppEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized { .. } => f.write_str("Initialized"),
            Self::AssetLoaded { kind, result } => f
                .debug_struct("AssetLoaded")
                .field("kind", kind)
                .field("ok", &result.is_ok())
                .finish(),
        }
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<AppEvent>,
    state: Option<(Context, Landscape)>,
    // Taken once the window exists.
    config: Option<LandscapeConfig>,
}

impl App {
    fn new(event_loop: &EventLoop<AppEvent>, config: LandscapeConfig) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            state: None,
            config: Some(config),
        })
    }

    /// Start every model load in the background. Results arrive as
    /// [`AppEvent::AssetLoaded`].
    fn spawn_asset_loads(&self, requests: Vec<AssetRequest>) {
        for request in requests {
            let kind = request.kind;
            let proxy = self.proxy.clone();
            let load = async move {
                let result = request.load().await;
                if proxy.send_event(AppEvent::AssetLoaded { kind, result }).is_err() {
                    log::debug!("Event loop closed before the {kind} finished loading");
                }
            };

            #[cfg(not(target_arch = "wasm32"))]
            self.async_runtime.spawn(load);

            #[cfg(target_arch = "wasm32")]
            wasm_bindgen_futures::spawn_local(load);
        }
    }

    fn initialized(&mut self, mut ctx: Context, landscape: Landscape) {
        if let Some(window) = ctx.window().cloned() {
            let size = window.inner_size();
            ctx.resize(size.width, size.height);
            window.request_redraw();
        }
        self.spawn_asset_loads(landscape.asset_requests());
        self.state = Some((ctx, landscape));
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(config) = self.config.take() else {
            // Already initialized, e.g. resumed again on mobile.
            return;
        };

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title(WINDOW_TITLE);

        #[cfg(target_arch = "wasm32")]
        {
            use winit::platform::web::WindowAttributesExtWebSys;
            window_attributes = window_attributes.with_canvas(Some(full_window_canvas()));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Could not create a window: {e}");
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        let landscape = Landscape::new(config, size.width, size.height);
        let init = async move {
            let ctx = Context::new(window, &landscape.scene).await?;
            anyhow::Ok((ctx, landscape))
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(init) {
                Ok((ctx, landscape)) => self.initialized(ctx, landscape),
                Err(e) => {
                    log::error!("GPU initialization failed: {e:#}");
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match init.await {
                    Ok((ctx, landscape)) => {
                        if proxy
                            .send_event(AppEvent::Initialized { ctx, landscape })
                            .is_err()
                        {
                            log::error!("Event loop closed during initialization");
                        }
                    }
                    Err(e) => log::error!("GPU initialization failed: {e:#}"),
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::Initialized { ctx, landscape } => {
                // This is the message from our wasm `spawn_local`
                self.initialized(ctx, landscape);
            }
            AppEvent::AssetLoaded { kind, result } => {
                let Some((_, landscape)) = &mut self.state else {
                    return;
                };
                match result {
                    Ok(model) => {
                        let ids = landscape.attach_asset(kind, model);
                        log::info!("Loaded {kind} ({} placement(s))", ids.len());
                    }
                    Err(e) => log::warn!("{kind} failed to load, leaving it out: {e:#}"),
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let (ctx, landscape) = match &mut self.state {
            Some(state) => (&mut state.0, &mut state.1),
            None => return,
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                landscape.resize(size.width, size.height);
                ctx.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                landscape.tick();
                match ctx.render(landscape) {
                    Ok(()) => {}
                    // Reconfigure the surface if it's lost or outdated
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        if let Some(size) = ctx.window().map(|w| w.inner_size()) {
                            ctx.resize(size.width, size.height);
                        }
                    }
                    Err(e) => {
                        log::error!("Unable to render {}", e);
                    }
                }
                if let Some(window) = ctx.window() {
                    window.request_redraw();
                }
            }
            other => landscape.handle_window_event(&other),
        }
    }
}

/// A canvas appended to the page body and stretched over the whole window.
#[cfg(target_arch = "wasm32")]
fn full_window_canvas() -> web_sys::HtmlCanvasElement {
    use wasm_bindgen::JsCast;

    let window = web_sys::window().unwrap_throw();
    let document = window.document().unwrap_throw();
    let body = document.body().unwrap_throw();
    let canvas: web_sys::HtmlCanvasElement = document
        .create_element("canvas")
        .unwrap_throw()
        .unchecked_into();
    let style = canvas.style();
    for (property, value) in [
        ("width", "100vw"),
        ("height", "100vh"),
        ("display", "block"),
    ] {
        style.set_property(property, value).unwrap_throw();
    }
    body.style().set_property("margin", "0").unwrap_throw();
    body.append_child(&canvas).unwrap_throw();
    canvas
}

/// Open the window and run the valley until it is closed.
pub fn run(config: LandscapeConfig) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    let event_loop: EventLoop<AppEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}
