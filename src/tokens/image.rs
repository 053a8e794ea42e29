use crate::tools::image::Detail;

const BASE_TOKENS: u32 = 85;
const TILE_TOKENS: u32 = 170;
const TILE_SIZE: u32 = 512;
const MAX_SIDE: u32 = 1024;

/// Prompt tokens charged for one image.
///
/// The image is scaled down so that its longer side fits in 1024 pixels and then cut
/// into 512 pixel tiles. High detail (the default) costs a base fee plus a fee per tile,
/// low detail only the base fee.
pub fn image_token_cost(width: u32, height: u32, detail: Option<Detail>) -> u32 {
    if detail == Some(Detail::Low) {
        return BASE_TOKENS;
    }

    let (width, height) = fit_within(width, height, MAX_SIDE);
    let tiles = width.div_ceil(TILE_SIZE) * height.div_ceil(TILE_SIZE);
    BASE_TOKENS + TILE_TOKENS * tiles
}

/// Cost of an image whose pixel size is not known locally
pub fn unknown_image_token_cost() -> u32 {
    BASE_TOKENS
}

fn fit_within(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longer = width.max(height);
    if longer <= max_side {
        return (width, height);
    }

    let scale = f64::from(max_side) / f64::from(longer);
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}
