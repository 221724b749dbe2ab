use super::super::{Model, Msg, Slot};
use super::preview_area::render_slot_preview;
use super::utils::{debounce, extract_image_file};
use wasm_bindgen::JsCast;
use web_sys::{DragEvent, HtmlInputElement};
use yew::prelude::*;

pub fn render_upload_section(model: &Model, ctx: &Context<Model>) -> Html {
    html! {
        <div class="upload-section">
            { render_slot(model, ctx, Slot::Source) }
            { render_slot(model, ctx, Slot::Target) }
        </div>
    }
}

fn render_slot(model: &Model, ctx: &Context<Model>, slot: Slot) -> Html {
    let link = ctx.link();
    let handle_change = link.callback(move |e: Event| {
        let input: HtmlInputElement = e.target_unchecked_into();
        let file = input.files().as_ref().and_then(extract_image_file);

        input.set_value("");

        match file {
            Some(file) => Msg::FileSelected(slot, file),
            None => Msg::SetError(Some("No valid image file selected.".into())),
        }
    });

    let handle_drag_over = link.callback(move |e: DragEvent| {
        e.prevent_default();
        Msg::SetDragging(Some(slot))
    });

    let handle_drag_leave = link.callback(|e: DragEvent| {
        e.prevent_default();
        Msg::SetDragging(None)
    });

    let handle_drop = link.callback(move |e: DragEvent| Msg::HandleDrop(slot, e));
    let input_id = slot.input_id();
    let trigger_file_input = Callback::from(move |_| {
        if let Some(input) = web_sys::window()
            .and_then(|window| window.document())
            .and_then(|document| document.get_element_by_id(input_id))
        {
            if let Ok(html_input) = input.dyn_into::<web_sys::HtmlElement>() {
                html_input.click();
            }
        }
    });

    let disabled = model.running;
    let onclick = if disabled {
        Callback::noop()
    } else {
        debounce(300, move || trigger_file_input.emit(()))
    };

    html! {
        <div class="upload-slot">
            <h2>{ slot.label() }</h2>
            <input
                type="file"
                id={input_id}
                accept="image/*"
                style="display: none;"
                onchange={handle_change}
                disabled={disabled}
            />

            <div
                class={classes!(
                    "upload-area",
                    (model.dragging == Some(slot)).then_some("drag-over"),
                    disabled.then_some("disabled")
                )}
                ondragover={handle_drag_over}
                ondragleave={handle_drag_leave}
                ondrop={handle_drop}
                onclick={onclick}
            >
                {
                    if model.slot(slot).is_some() {
                        render_slot_preview(model, ctx, slot)
                    } else {
                        html! {
                            <div class="upload-placeholder">
                                <i class="fa-solid fa-cloud-arrow-up"></i>
                                <p>{"Drag & drop an image here, or click"}</p>
                                <p class="file-types">{"Supported formats: JPG, PNG, WEBP, GIF"}</p>
                            </div>
                        }
                    }
                }
            </div>
        </div>
    }
}
