use super::super::{Model, Msg, Slot};
use yew::prelude::*;

pub fn render_slot_preview(model: &Model, ctx: &Context<Model>, slot: Slot) -> Html {
    let Some(slot_file) = model.slot(slot) else {
        return html! {};
    };
    let link = ctx.link();
    let name = slot_file.file.name();

    html! {
        <div class="preview-item selected" title={name.clone()}>
            <img src={slot_file.preview_url.to_string()} alt={name} />
            if !model.running {
                <button
                    class="remove-btn"
                    title="Remove this image"
                    onclick={link.callback(move |e: MouseEvent| {
                        e.stop_propagation();
                        Msg::ClearSlot(slot)
                    })}
                >
                    <i class="fa-solid fa-times" style="font-size: 10px;"></i>
                </button>
            }
        </div>
    }
}
