//! I420 ↔ RGB conversion (BT.601, full range).

use livekit::webrtc::prelude::*;

/// A packed RGB24 image ready for upload to a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Planes and strides of an I420 image.
pub struct I420Planes<'a> {
    pub width: u32,
    pub height: u32,
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub stride_y: u32,
    pub stride_u: u32,
    pub stride_v: u32,
}

pub fn i420_to_rgb(planes: &I420Planes<'_>) -> RgbFrame {
    let w = planes.width as usize;
    let h = planes.height as usize;
    let mut rgb = vec![0u8; w * h * 3];

    for row in 0..h {
        let y_row = row * planes.stride_y as usize;
        let u_row = (row / 2) * planes.stride_u as usize;
        let v_row = (row / 2) * planes.stride_v as usize;
        for col in 0..w {
            let y = planes.y[y_row + col] as f32;
            let u = planes.u[u_row + col / 2] as f32 - 128.0;
            let v = planes.v[v_row + col / 2] as f32 - 128.0;

            let out = (row * w + col) * 3;
            rgb[out] = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            rgb[out + 1] = (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8;
            rgb[out + 2] = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        }
    }

    RgbFrame {
        width: planes.width,
        height: planes.height,
        pixels: rgb,
    }
}

pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.168736 * r - 0.331264 * g + 0.5 * b + 128.0;
    let v = 0.5 * r - 0.418688 * g - 0.081312 * b + 128.0;
    (
        y.round().clamp(0.0, 255.0) as u8,
        u.round().clamp(0.0, 255.0) as u8,
        v.round().clamp(0.0, 255.0) as u8,
    )
}

/// Destination I420 planes and their strides.
pub struct I420PlanesMut<'a> {
    pub y: &'a mut [u8],
    pub u: &'a mut [u8],
    pub v: &'a mut [u8],
    pub stride_y: u32,
    pub stride_u: u32,
    pub stride_v: u32,
}

/// Copy bi-planar NV12 (Y, interleaved UV) into I420 planes.
pub fn nv12_to_i420(
    width: u32,
    height: u32,
    y: &[u8],
    stride_y: usize,
    uv: &[u8],
    stride_uv: usize,
    dst: I420PlanesMut<'_>,
) {
    let (w, h) = (width as usize, height as usize);
    for row in 0..h {
        let src = &y[row * stride_y..][..w];
        dst.y[row * dst.stride_y as usize..][..w].copy_from_slice(src);
    }

    let chroma_w = w.div_ceil(2);
    for row in 0..h.div_ceil(2) {
        let src = &uv[row * stride_uv..][..chroma_w * 2];
        let u_row = row * dst.stride_u as usize;
        let v_row = row * dst.stride_v as usize;
        for col in 0..chroma_w {
            dst.u[u_row + col] = src[col * 2];
            dst.v[v_row + col] = src[col * 2 + 1];
        }
    }
}

/// Convert packed BGR24 rows into I420, averaging chroma over 2x2 blocks.
pub fn bgr_to_i420(bgr: &[u8], stride: usize, width: u32, height: u32, dst: I420PlanesMut<'_>) {
    let (w, h) = (width as usize, height as usize);
    let pixel = |row: usize, col: usize| {
        let at = row * stride + col * 3;
        rgb_to_yuv(bgr[at + 2], bgr[at + 1], bgr[at])
    };

    for row in 0..h {
        for col in 0..w {
            dst.y[row * dst.stride_y as usize + col] = pixel(row, col).0;
        }
    }

    for row in 0..h.div_ceil(2) {
        for col in 0..w.div_ceil(2) {
            let (mut u, mut v, mut n) = (0u32, 0u32, 0u32);
            for r in (row * 2)..(row * 2 + 2).min(h) {
                for c in (col * 2)..(col * 2 + 2).min(w) {
                    let (_, pu, pv) = pixel(r, c);
                    u += u32::from(pu);
                    v += u32::from(pv);
                    n += 1;
                }
            }
            dst.u[row * dst.stride_u as usize + col] = (u / n) as u8;
            dst.v[row * dst.stride_v as usize + col] = (v / n) as u8;
        }
    }
}

/// Convert a decoded frame, whatever its native buffer type.
pub(crate) fn frame_to_rgb(frame: &BoxVideoFrame) -> RgbFrame {
    let i420 = frame.buffer.to_i420();
    let (y, u, v) = i420.data();
    let (stride_y, stride_u, stride_v) = i420.strides();
    i420_to_rgb(&I420Planes {
        width: frame.buffer.width(),
        height: frame.buffer.height(),
        y,
        u,
        v,
        stride_y,
        stride_u,
        stride_v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, stride_pad: u32, yuv: (u8, u8, u8)) -> (Vec<u8>, Vec<u8>, Vec<u8>, u32, u32) {
        let stride_y = width + stride_pad;
        let stride_c = width.div_ceil(2) + stride_pad;
        let chroma_rows = height.div_ceil(2);
        (
            vec![yuv.0; (stride_y * height) as usize],
            vec![yuv.1; (stride_c * chroma_rows) as usize],
            vec![yuv.2; (stride_c * chroma_rows) as usize],
            stride_y,
            stride_c,
        )
    }

    fn convert(width: u32, height: u32, pad: u32, yuv: (u8, u8, u8)) -> RgbFrame {
        let (y, u, v, stride_y, stride_c) = solid(width, height, pad, yuv);
        i420_to_rgb(&I420Planes {
            width,
            height,
            y: &y,
            u: &u,
            v: &v,
            stride_y,
            stride_u: stride_c,
            stride_v: stride_c,
        })
    }

    #[test]
    fn white_and_black() {
        let white = convert(4, 2, 0, (255, 128, 128));
        assert!(white.pixels.iter().all(|&c| c == 255));

        let black = convert(4, 2, 0, (0, 128, 128));
        assert!(black.pixels.iter().all(|&c| c == 0));
    }

    #[test]
    fn output_is_packed_despite_stride_padding() {
        let frame = convert(6, 4, 10, (255, 128, 128));
        assert_eq!((frame.width, frame.height), (6, 4));
        assert_eq!(frame.pixels.len(), 6 * 4 * 3);
    }

    #[test]
    fn odd_dimensions_use_rounded_up_chroma() {
        let frame = convert(5, 3, 0, (0, 128, 128));
        assert_eq!(frame.pixels.len(), 5 * 3 * 3);
    }

    struct Owned {
        y: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
        cw: u32,
    }

    impl Owned {
        fn new(width: u32, height: u32) -> Self {
            let cw = width.div_ceil(2);
            let ch = height.div_ceil(2);
            Self {
                y: vec![0; (width * height) as usize],
                u: vec![0; (cw * ch) as usize],
                v: vec![0; (cw * ch) as usize],
                cw,
            }
        }

        fn planes(&mut self, width: u32) -> I420PlanesMut<'_> {
            I420PlanesMut {
                y: &mut self.y,
                u: &mut self.u,
                v: &mut self.v,
                stride_y: width,
                stride_u: self.cw,
                stride_v: self.cw,
            }
        }
    }

    #[test]
    fn nv12_deinterleaves_chroma_and_skips_row_padding() {
        // 4x2 image, source rows padded to 8 bytes
        let y: Vec<u8> = (0..16).collect();
        let uv = vec![10, 20, 11, 21, 0, 0, 0, 0];
        let mut out = Owned::new(4, 2);
        nv12_to_i420(4, 2, &y, 8, &uv, 8, out.planes(4));

        assert_eq!(out.y, vec![0, 1, 2, 3, 8, 9, 10, 11]);
        assert_eq!(out.u, vec![10, 11]);
        assert_eq!(out.v, vec![20, 21]);
    }

    #[test]
    fn bgr_gray_maps_to_neutral_chroma() {
        let bgr = vec![128u8; 3 * 3 * 3];
        let mut out = Owned::new(3, 3);
        bgr_to_i420(&bgr, 9, 3, 3, out.planes(3));

        assert!(out.y.iter().all(|&y| y == 128));
        assert!(out.u.iter().chain(&out.v).all(|&c| c == 128));
    }

    #[test]
    fn bgr_channel_order_is_respected() {
        // pure blue in BGR order
        let bgr = [255u8, 0, 0].repeat(4);
        let mut out = Owned::new(2, 2);
        bgr_to_i420(&bgr, 6, 2, 2, out.planes(2));

        let blue = rgb_to_yuv(0, 0, 255);
        assert_eq!(out.y[0], blue.0);
        assert_eq!((out.u[0], out.v[0]), (blue.1, blue.2));
    }

    #[test]
    fn primary_colors_survive_conversion() {
        for rgb in [(255u8, 0u8, 0u8), (0, 255, 0), (0, 0, 255)] {
            let yuv = rgb_to_yuv(rgb.0, rgb.1, rgb.2);
            let frame = convert(2, 2, 0, yuv);
            let got = (frame.pixels[0], frame.pixels[1], frame.pixels[2]);
            for (a, b) in [(got.0, rgb.0), (got.1, rgb.1), (got.2, rgb.2)] {
                assert!(a.abs_diff(b) <= 3, "{rgb:?} came back as {got:?}");
            }
        }
    }
}
