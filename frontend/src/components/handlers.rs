use super::super::{Model, Msg, Slot, SlotFile};
use super::utils::extract_image_file;
use crate::api::stream_swap;
use gloo_file::{File as GlooFile, ObjectUrl};
use shared::{JobOptions, ProgressEvent};
use wasm_bindgen_futures::spawn_local;
use web_sys::DragEvent;
use yew::prelude::*;

pub fn handle_file_selected(model: &mut Model, slot: Slot, file: GlooFile) -> bool {
    if model.running {
        return false;
    }
    log::debug!("{:?} image selected: {}", slot, file.name());
    model.error = None;
    let preview_url = ObjectUrl::from(file.clone());
    *model.slot_mut(slot) = Some(SlotFile { file, preview_url });
    true
}

pub fn handle_clear_slot(model: &mut Model, slot: Slot) -> bool {
    if model.running {
        return false;
    }
    model.slot_mut(slot).take().is_some()
}

pub fn handle_drop(model: &mut Model, ctx: &Context<Model>, slot: Slot, event: DragEvent) -> bool {
    event.prevent_default();
    model.dragging = None;
    if model.running {
        return true;
    }

    match event
        .data_transfer()
        .and_then(|data_transfer| data_transfer.files())
        .as_ref()
        .and_then(extract_image_file)
    {
        Some(file) => ctx.link().send_message(Msg::FileSelected(slot, file)),
        None => {
            log::warn!("Dropped item on {:?} is not an image", slot);
            ctx.link()
                .send_message(Msg::SetError(Some("Dropped file is not an image.".into())));
        }
    }
    true
}

/// Clears the previous result and streams a new job. Missing inputs are still
/// sent so the server reports them through the status panel.
pub fn handle_start_swap(model: &mut Model, ctx: &Context<Model>) -> bool {
    if model.running {
        return false;
    }
    model.running = true;
    model.error = None;
    model.job_id = None;
    model.events.clear();
    model.output_url = None;
    model.download_url = None;

    let source = model.source.as_ref().map(|slot| slot.file.clone());
    let target = model.target.as_ref().map(|slot| slot.file.clone());
    let options = JobOptions {
        enhance: model.enhance,
        many_faces: model.many_faces,
    };
    let token = model.api_token.clone();
    let link = ctx.link().clone();

    spawn_local(async move {
        let on_started = link.callback(Msg::JobStarted);
        let on_event = link.callback(Msg::Progress);

        match stream_swap(source, target, options, token, on_started, on_event).await {
            Ok(()) => link.send_message(Msg::StreamClosed),
            Err(e) => {
                log::error!("Swap request failed: {}", e);
                link.send_message(Msg::SetError(Some(e)));
            }
        }
    });

    true
}

pub fn handle_progress(model: &mut Model, event: ProgressEvent) -> bool {
    log::debug!("Progress {}: {}", event.sequence, event.message);

    if event.is_terminal() {
        model.running = false;
        if event.artifact_visible {
            if let Some(job_id) = &model.job_id {
                model.output_url = Some(format!("/api/jobs/{}/output", job_id));
            }
            model.download_url = event.artifact_path.clone();
        }
    }
    model.events.push(event);
    true
}

/// The stream ended. If no terminal event arrived the job state is unknown.
pub fn handle_stream_closed(model: &mut Model) -> bool {
    let finished = model.events.last().is_some_and(|event| event.is_terminal());
    model.running = false;
    if !finished {
        model.error = Some("Connection closed before the job finished.".into());
    }
    true
}
