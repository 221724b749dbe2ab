use super::super::Model;
use crate::api::with_token;
use yew::prelude::*;

pub fn render_results(model: &Model) -> Html {
    let (Some(output_url), Some(download_url)) = (&model.output_url, &model.download_url) else {
        return html! {};
    };
    let token = model.api_token.as_deref();

    html! {
        <div class="results-container">
            <div class="result-header">
                <h2><i class="fa-solid fa-image"></i>{" Result"}</h2>
            </div>
            <img
                id="swap-output"
                src={with_token(output_url, token)}
                alt="Swapped face result"
            />
            <div class="button-container">
                <a
                    class="analyze-btn"
                    href={with_token(download_url, token)}
                    download="swapped_result.png"
                >
                    <i class="fa-solid fa-download"></i>{" Download Result"}
                </a>
            </div>
        </div>
    }
}
