#[cfg(feature = "integration-tests")]
use crate::common::test_utils::seeded;
#[cfg(feature = "integration-tests")]
mod common;

#[test]
#[cfg(feature = "integration-tests")]
fn should_render_clear_colour_in_the_sky() {
    use valley_scene::{
        Landscape,
        context::{Context, MSAA_SAMPLES},
        landscape::builder::BACKGROUND,
    };

    let mut config = seeded(5);
    // nothing in front of the sky
    config.cloud_count = 0;
    let mut landscape = Landscape::new(config, 800, 600);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut ctx = runtime
        .block_on(Context::offscreen(800, 600, &landscape.scene))
        .expect("no GPU for the offscreen context");

    landscape.resize(1024, 768);
    ctx.resize(1024, 768);
    assert_eq!((ctx.config.width, ctx.config.height), (1024, 768));
    assert!(matches!(ctx.sample_count(), 1 | MSAA_SAMPLES));

    ctx.render(&mut landscape).expect("offscreen rendering can't lose a surface");
    let img = ctx.read_pixels().unwrap();
    assert_eq!(img.dimensions(), (1024, 768));

    // The target is sRGB, so the stored bytes are the hex colour again.
    let [r, g, b] = [(BACKGROUND >> 16) as u8, (BACKGROUND >> 8) as u8, BACKGROUND as u8];
    let close = |got: u8, want: u8| got.abs_diff(want) <= 2;
    for (x, y) in [(0, 0), (512, 0), (1023, 0)] {
        let pixel = img.get_pixel(x, y).0;
        assert!(
            close(pixel[0], r) && close(pixel[1], g) && close(pixel[2], b),
            "sky pixel ({x}, {y}) is {pixel:?}, expected {BACKGROUND:06x}"
        );
        assert_eq!(pixel[3], 255);
    }

    // the ground fills the bottom of the frame
    let ground = img.get_pixel(512, 767).0;
    assert!(!(close(ground[0], r) && close(ground[1], g) && close(ground[2], b)));
}
