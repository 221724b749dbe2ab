use super::super::{Model, Msg};
use super::utils::debounce;
use shared::JobPhase;
use yew::prelude::*;

pub fn render_status_panel(model: &Model, ctx: &Context<Model>) -> Html {
    let link = ctx.link().clone();

    html! {
        <div class="status-panel">
            <div class="options">
                <label>
                    <input
                        type="checkbox"
                        checked={model.enhance}
                        disabled={model.running}
                        onchange={ctx.link().callback(|_| Msg::ToggleEnhance)}
                    />
                    <span class="checkbox-label-text">{ "Enable Face Enhancer" }</span>
                </label>
                <label>
                    <input
                        type="checkbox"
                        checked={model.many_faces}
                        disabled={model.running}
                        onchange={ctx.link().callback(|_| Msg::ToggleManyFaces)}
                    />
                    <span class="checkbox-label-text">{ "Detect Multiple Faces" }</span>
                </label>
            </div>

            <div class="button-container">
                <button
                    id="start-swap-btn"
                    class="analyze-btn"
                    disabled={model.running}
                    onclick={debounce(300, {
                        let link = link.clone();
                        move || link.send_message(Msg::StartSwap)
                    })}
                >
                    { render_start_button_content(model) }
                </button>
            </div>

            <textarea
                id="status-text"
                class={classes!("status-text", status_class(model))}
                readonly=true
                rows="2"
                placeholder="Status updates will appear here"
                value={model.status_text().to_string()}
            />
        </div>
    }
}

fn status_class(model: &Model) -> Option<&'static str> {
    match model.events.last().map(|event| event.phase) {
        Some(JobPhase::Succeeded) => Some("status-success"),
        Some(JobPhase::Failed) => Some("status-failed"),
        Some(JobPhase::Pending) | Some(JobPhase::Running) => Some("status-running"),
        None => None,
    }
}

fn render_start_button_content(model: &Model) -> Html {
    if model.running {
        html! { <><i class="fa-solid fa-spinner fa-spin"></i>{" Swapping..."}</> }
    } else {
        html! { <><i class="fa-solid fa-wand-magic-sparkles"></i>{" Start Face Swap"}</> }
    }
}
