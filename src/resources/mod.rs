/**
 * This module contains all logic for loading models and textures from external files.
 *
 * Natively files are read from disk relative to the working directory, on the
 * web they are fetched relative to the page origin.
 */
pub mod import;

pub use import::load_model_gltf;

/// Join an asset directory and a file name the same way on disk and on the web.
pub fn asset_path(asset_dir: &str, file_name: &str) -> String {
    let dir = asset_dir.trim_end_matches('/');
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{dir}/{file_name}")
    }
}

#[cfg(target_arch = "wasm32")]
fn format_url(path: &str) -> anyhow::Result<reqwest::Url> {
    use anyhow::Context;

    let window = web_sys::window().context("No window available")?;
    let origin = window
        .location()
        .origin()
        .map_err(|e| anyhow::anyhow!("Could not read page origin: {e:?}"))?;
    let base = reqwest::Url::parse(&format!("{origin}/"))?;
    Ok(base.join(path)?)
}

pub async fn load_binary(path: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(path)?;
        reqwest::get(url)
            .await?
            .error_for_status()?
            .bytes()
            .await?
            .to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        use anyhow::Context;

        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {path}"))?
    };

    Ok(data)
}
