use yew::prelude::*;

/// Renders the application header
pub fn render_header() -> Html {
    html! {
        <header class="app-header">
            <h1><i class="fa-solid fa-masks-theater"></i> {" Face Swap Studio"}</h1>
            <p class="subtitle">{"Upload a source face and a target image, then start the swap"}</p>
        </header>
    }
}
