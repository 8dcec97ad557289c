use anyhow::{Context, Result};
use pixels::{Pixels, SurfaceTexture};
use rand::rngs::ThreadRng;
use std::path::Path;
use std::sync::Arc;
use stopsig_core::{Key, Phase, StandardPhase};
use stopsig_experiment::{
    BlockStats, ExperimentConfig, ExperimentEvent, ExperimentStateMachine, text,
};
use stopsig_render::{Scene, SkiaRenderer, load_system_font};
use stopsig_timing::{HighPrecisionTimer, Timer};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowId},
};

const RESULTS_FILE: &str = "stop_signal_results.json";

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    experiment: ExperimentStateMachine<StandardPhase, HighPrecisionTimer, ThreadRng>,
    renderer: Option<SkiaRenderer>,
    current_size: Option<PhysicalSize<u32>>,
    scale_factor: f64,
    refresh_rate: Option<f64>,

    results_saved: bool,
    should_exit: bool,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = ExperimentConfig::<StandardPhase>::default();
        let timer = HighPrecisionTimer::new();
        let rng = rand::rng();
        let experiment = ExperimentStateMachine::new(config, timer, rng);

        Ok(Self {
            window: None,
            pixels: None,
            experiment,
            renderer: None,
            current_size: None,
            scale_factor: 1.0,
            refresh_rate: None,
            results_saved: false,
            should_exit: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        println!("=== STOP-SIGNAL TASK ===");
        println!("Platform: {}", std::env::consts::OS);
        println!("Architecture: {}", std::env::consts::ARCH);
        println!("Press SPACE to start or ESC to exit.\n");

        event_loop.run_app(&mut self)?;
        Ok(())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow::anyhow!("No monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("Stop-Signal Task")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor.clone()))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();
        let scale_factor = window.scale_factor();

        self.current_size = Some(physical_size);
        self.scale_factor = scale_factor;

        println!("Display Configuration:");
        println!(
            "  Physical size: {}×{}",
            physical_size.width, physical_size.height
        );
        println!("  Scale factor: {:.2}", scale_factor);
        if let Some(refresh_rate) = self.refresh_rate {
            println!("  Refresh rate: {:.1} Hz", refresh_rate);
        }

        let surface_texture =
            SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());

        self.pixels = Some(Pixels::new(
            physical_size.width,
            physical_size.height,
            surface_texture,
        )?);

        let font = load_system_font()?;
        self.renderer = Some(SkiaRenderer::new(
            physical_size.width,
            physical_size.height,
            font,
        ));

        window.set_cursor_visible(false);
        window.request_redraw();

        self.window = Some(window);

        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let pix = self.pixels.as_mut().context("no pixel surface")?;
        let renderer = self.renderer.as_mut().context("no renderer")?;

        let phase = *self.experiment.current_phase();
        let banner = Self::banner_lines(&self.experiment, phase);
        let scene = Scene {
            frame: self.experiment.display_frame(),
            banner: &banner,
            progress: self.experiment.trial_progress(),
            practice: phase.is_practice(),
        };

        let mut timer = self.experiment.timer.clone();
        let frame = pix.frame_mut();
        renderer.render_frame(&phase, &scene, frame, &mut timer)?;
        pix.render()?;
        // keep the recorded frame times; the render borrow needed a clone
        self.experiment.timer = timer;

        if let Some(window) = &self.window {
            window.request_redraw(); // next VSync-driven frame
        }

        Ok(())
    }

    fn banner_lines(
        experiment: &ExperimentStateMachine<StandardPhase, HighPrecisionTimer, ThreadRng>,
        phase: StandardPhase,
    ) -> Vec<String> {
        if phase.is_welcome() {
            return text::WELCOME_LINES.iter().map(|s| s.to_string()).collect();
        }
        if phase.is_debrief() {
            let mut lines: Vec<String> =
                text::END_LINES.iter().map(|s| s.to_string()).collect();
            lines.push(String::new());
            lines.extend(Self::summary_lines(&experiment.overall_stats()));
            return lines;
        }

        if let Some(feedback) = experiment.feedback_text() {
            return vec![feedback.to_string()];
        }

        if experiment.in_block_break() {
            let mut lines = vec![text::BREAK_MSG.to_string(), String::new()];
            if let Some(stats) = experiment.block_summary() {
                lines.extend(Self::summary_lines(stats));
            }
            lines.push(String::new());
            let seconds = experiment.break_remaining_ms().unwrap_or(0) / 1000 + 1;
            lines.push(format!(
                "The next block starts in {seconds} s (SPACE to skip)"
            ));
            return lines;
        }

        Vec::new()
    }

    fn summary_lines(stats: &BlockStats) -> Vec<String> {
        let mut lines = vec![text::GO_HEADER.to_string()];
        match stats.mean_go_rt_ms {
            Some(rt) => lines.push(format!("Average response time = {rt:.0} milliseconds")),
            None => lines.push("Average response time = n/a".to_string()),
        }
        lines.push(format!(
            "Proportion missed go = {:.2} (should be 0)",
            stats.prop_go_missed
        ));
        lines.push(String::new());
        lines.push(text::STOP_HEADER.to_string());
        if let Some(prop) = stats.prop_correct_stops {
            lines.push(format!(
                "Proportion correct stops = {prop:.2} (should be close to 0.5)"
            ));
        }
        lines
    }

    fn update(&mut self) {
        for event in self.experiment.update() {
            self.experiment.handle_event(event);
        }
        if self.experiment.current_phase().is_debrief() && !self.results_saved {
            self.save_results();
        }
    }

    fn save_results(&mut self) {
        let path = Path::new(RESULTS_FILE);
        match self.experiment.save_results(path) {
            Ok(()) => {
                println!("Results saved to {}", path.display());
                self.results_saved = true;
            }
            Err(error) => eprintln!("Failed to save results: {error:#}"),
        }
    }

    fn handle_input(&mut self, key: winit::keyboard::PhysicalKey, event_loop: &ActiveEventLoop) {
        use winit::keyboard::{KeyCode, PhysicalKey};
        if let PhysicalKey::Code(code) = key {
            match code {
                KeyCode::Space => {
                    self.experiment.handle_event(ExperimentEvent::SpacePressed);
                }
                KeyCode::ArrowLeft => {
                    self.experiment
                        .handle_event(ExperimentEvent::ResponseKey(Key::new("leftarrow")));
                }
                KeyCode::ArrowRight => {
                    self.experiment
                        .handle_event(ExperimentEvent::ResponseKey(Key::new("rightarrow")));
                }
                KeyCode::Escape => self.cleanup_and_exit(event_loop),
                _ => {}
            }
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        self.current_size = Some(new_size);
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                eprintln!("Failed to resize surface: {}", e);
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                eprintln!("Failed to resize buffer: {}", e);
            }
        }
        if let Some(renderer) = &mut self.renderer {
            renderer.resize(new_size.width, new_size.height);
        }
        println!("Display resized to: {}×{}", new_size.width, new_size.height);
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }

        if !self.results_saved && !self.experiment.records().is_empty() {
            self.save_results();
        }

        let stats = self.experiment.timer.frame_stats();
        if stats.average_frame_time_ns > 0.0 {
            println!(
                "Frame timing: {:.3} ms/frame, {:.1} Hz, jitter {:.3} ms",
                stats.average_frame_time_ns / 1_000_000.0,
                stats.effective_fps,
                stats.jitter_ns / 1_000_000.0,
            );
        }
        println!("\nExperiment closed. Thank you!");

        self.should_exit = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                eprintln!("Failed to create window and surface: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.cleanup_and_exit(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    eprintln!("Render failed: {e:#}");
                    event_loop.exit();
                    return;
                }
                self.update();
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed() && !event.repeat =>
            {
                self.handle_input(event.physical_key, event_loop);
            }
            WindowEvent::Resized(sz) => self.handle_resize(sz),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
                if let Some(window) = &self.window {
                    self.handle_resize(window.inner_size());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}
