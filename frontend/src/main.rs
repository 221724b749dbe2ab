mod api;
mod components;

use components::handlers;
use components::header::render_header;
use components::results::render_results;
use components::status_panel::render_status_panel;
use components::upload_section::render_upload_section;
use components::utils::{render_error_message, token_from_location};
use gloo_file::{File as GlooFile, ObjectUrl};
use shared::ProgressEvent;
use web_sys::DragEvent;
use yew::prelude::*;

/// The two upload controls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Source,
    Target,
}

impl Slot {
    fn label(self) -> &'static str {
        match self {
            Slot::Source => "Source Face",
            Slot::Target => "Target Image",
        }
    }

    fn input_id(self) -> &'static str {
        match self {
            Slot::Source => "source-input",
            Slot::Target => "target-input",
        }
    }
}

pub struct SlotFile {
    file: GlooFile,
    preview_url: ObjectUrl,
}

pub enum Msg {
    // Uploads
    FileSelected(Slot, GlooFile),
    ClearSlot(Slot),
    HandleDrop(Slot, DragEvent),
    SetDragging(Option<Slot>),

    // Options
    ToggleEnhance,
    ToggleManyFaces,

    // Job
    StartSwap,
    JobStarted(String),
    Progress(ProgressEvent),
    StreamClosed,

    SetError(Option<String>),
}

pub struct Model {
    source: Option<SlotFile>,
    target: Option<SlotFile>,
    enhance: bool,
    many_faces: bool,
    running: bool,
    job_id: Option<String>,
    events: Vec<ProgressEvent>,
    output_url: Option<String>,
    download_url: Option<String>,
    error: Option<String>,
    dragging: Option<Slot>,
    api_token: Option<String>,
}

impl Model {
    fn slot(&self, slot: Slot) -> Option<&SlotFile> {
        match slot {
            Slot::Source => self.source.as_ref(),
            Slot::Target => self.target.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Option<SlotFile> {
        match slot {
            Slot::Source => &mut self.source,
            Slot::Target => &mut self.target,
        }
    }

    fn status_text(&self) -> &str {
        self.events
            .last()
            .map(|event| event.message.as_str())
            .unwrap_or("")
    }
}

impl Component for Model {
    type Message = Msg;
    type Properties = ();

    fn create(_ctx: &Context<Self>) -> Self {
        Self {
            source: None,
            target: None,
            enhance: true,
            many_faces: false,
            running: false,
            job_id: None,
            events: Vec::new(),
            output_url: None,
            download_url: None,
            error: None,
            dragging: None,
            api_token: token_from_location(),
        }
    }

    fn update(&mut self, ctx: &Context<Self>, msg: Self::Message) -> bool {
        match msg {
            Msg::FileSelected(slot, file) => handlers::handle_file_selected(self, slot, file),
            Msg::ClearSlot(slot) => handlers::handle_clear_slot(self, slot),
            Msg::HandleDrop(slot, event) => handlers::handle_drop(self, ctx, slot, event),
            Msg::SetDragging(slot) => {
                self.dragging = slot;
                true
            }

            Msg::ToggleEnhance => {
                self.enhance = !self.enhance;
                true
            }
            Msg::ToggleManyFaces => {
                self.many_faces = !self.many_faces;
                true
            }

            Msg::StartSwap => handlers::handle_start_swap(self, ctx),
            Msg::JobStarted(job_id) => {
                log::info!("Swap job {} started", job_id);
                self.job_id = Some(job_id);
                true
            }
            Msg::Progress(event) => handlers::handle_progress(self, event),
            Msg::StreamClosed => handlers::handle_stream_closed(self),

            Msg::SetError(error) => {
                self.error = error;
                self.running = false;
                true
            }
        }
    }

    fn view(&self, ctx: &Context<Self>) -> Html {
        html! {
            <div class="container">
                { render_header() }

                <main class="main-content">
                    { render_upload_section(self, ctx) }
                    { render_status_panel(self, ctx) }
                    { render_error_message(self) }
                    { render_results(self) }
                </main>

                <footer class="app-footer">
                    <p>{"Face Swap Studio | Fullstack Rust WASM"}</p>
                </footer>
            </div>
        }
    }
}

fn main() {
    wasm_logger::init(wasm_logger::Config::default());
    log::info!("Starting Face Swap Studio");
    yew::Renderer::<Model>::new().render();
}
