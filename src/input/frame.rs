//! 视频帧 (Frame)
//!
//! 3通道 8bit 交错存储, 通道顺序 BGR (与摄像头/解码器输出一致)

use anyhow::{bail, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageBuffer, Rgb, RgbImage};

/// 单帧图像 (BGR24)
///
/// `clone()` 即完整像素拷贝, 发布到共享状态时不会与生产者共用缓冲区
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    bgr: Vec<u8>,
}

impl Frame {
    /// 从BGR数据构造, 长度不匹配时返回 None
    pub fn from_bgr(width: u32, height: u32, bgr: Vec<u8>) -> Option<Self> {
        if bgr.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }
        Some(Self { width, height, bgr })
    }

    /// 纯色帧
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self {
            width,
            height,
            bgr: data,
        }
    }

    pub fn black(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.bgr.is_empty()
    }

    pub fn as_bgr(&self) -> &[u8] {
        &self.bgr
    }

    /// (b, g, r)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + x as usize) * 3;
        Some([self.bgr[i], self.bgr[i + 1], self.bgr[i + 2]])
    }

    /// 原地绘制用的视图 (像素按BGR解释, 颜色需按BGR给出)
    pub fn canvas_mut(&mut self) -> Option<ImageBuffer<Rgb<u8>, &mut [u8]>> {
        let (w, h) = (self.width, self.height);
        ImageBuffer::from_raw(w, h, self.bgr.as_mut_slice())
    }

    /// BGR → RGB
    pub fn to_rgb(&self) -> RgbImage {
        let mut rgb = Vec::with_capacity(self.bgr.len());
        for px in self.bgr.chunks_exact(3) {
            rgb.push(px[2]);
            rgb.push(px[1]);
            rgb.push(px[0]);
        }
        RgbImage::from_raw(self.width, self.height, rgb).unwrap_or_default()
    }

    /// JPEG编码, quality 限制在 1..=100
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        if self.is_empty() {
            bail!("cannot encode an empty frame");
        }
        let rgb = self.to_rgb();
        let mut buf = Vec::with_capacity(self.bgr.len() / 8);
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        encoder.encode(rgb.as_raw(), self.width, self.height, ExtendedColorType::Rgb8)?;
        Ok(buf)
    }
}
