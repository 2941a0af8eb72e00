//! RTSP backend on ffmpeg

use crate::frame::VideoFrame;
use crate::stream::{FrameStream, StreamConnector};
use crate::{CaptureError, StreamConfig};
use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use std::time::Instant;
use tracing::{debug, info};

/// Opens RTSP streams over TCP and decodes them to RGB24
#[derive(Debug, Clone, Copy, Default)]
pub struct RtspConnector;

impl StreamConnector for RtspConnector {
    fn connect(&self, url: &str, config: &StreamConfig) -> Result<Box<dyn FrameStream>, CaptureError> {
        ffmpeg::init().map_err(|e| CaptureError::Open(format!("ffmpeg init failed: {}", e)))?;

        // Socket timeout in microseconds; bounds the connect and every read
        let socket_timeout = config.connect_timeout.max(config.read_timeout).as_micros();
        let mut opts = ffmpeg::Dictionary::new();
        opts.set("rtsp_transport", "tcp");
        opts.set("timeout", &socket_timeout.to_string());

        let open = |e: ffmpeg::Error| CaptureError::Open(format!("{}: {}", url, e));
        let input = ffmpeg::format::input_with_dictionary(&url, opts).map_err(open)?;

        let (stream_index, decoder) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| CaptureError::Open(format!("{}: no video stream found", url)))?;
            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .map_err(open)?;
            (stream.index(), context.decoder().video().map_err(open)?)
        };

        info!("Opened RTSP stream {} ({}x{})", url, decoder.width(), decoder.height());
        Ok(Box::new(RtspStream {
            input,
            stream_index,
            decoder,
            scaler: None,
            decoded: ffmpeg::util::frame::Video::empty(),
            rgb: ffmpeg::util::frame::Video::empty(),
            opened: Instant::now(),
            sequence: 0,
        }))
    }
}

struct RtspStream {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    /// Scaler plus the source geometry it was built for
    scaler: Option<(scaling::Context, Pixel, u32, u32)>,
    decoded: ffmpeg::util::frame::Video,
    rgb: ffmpeg::util::frame::Video,
    opened: Instant,
    sequence: u64,
}

impl RtspStream {
    fn convert(&mut self) -> Result<VideoFrame, CaptureError> {
        let format = self.decoded.format();
        let (width, height) = (self.decoded.width(), self.decoded.height());

        let stale = !matches!(&self.scaler, Some((_, f, w, h)) if *f == format && *w == width && *h == height);
        if stale {
            debug!("Building scaler for {:?} {}x{}", format, width, height);
            let context = scaling::Context::get(
                format,
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| CaptureError::Decode(e.to_string()))?;
            self.scaler = Some((context, format, width, height));
        }

        if let Some((scaler, ..)) = self.scaler.as_mut() {
            scaler
                .run(&self.decoded, &mut self.rgb)
                .map_err(|e| CaptureError::Decode(e.to_string()))?;
        }

        let data = copy_rows(&self.rgb, width as usize, height as usize)
            .ok_or_else(|| CaptureError::Decode("scaled frame shorter than expected".into()))?;
        self.sequence += 1;
        Ok(VideoFrame::new(
            data,
            width,
            height,
            self.opened.elapsed().as_nanos() as u64,
            self.sequence,
        ))
    }
}

impl FrameStream for RtspStream {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CaptureError> {
        loop {
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                return self.convert().map(Some);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => return Err(CaptureError::Stream(e.to_string())),
            }
            if packet.stream() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| CaptureError::Decode(e.to_string()))?;
        }
    }
}

/// Copy plane 0 into a tightly packed RGB24 buffer, dropping row padding
fn copy_rows(frame: &ffmpeg::util::frame::Video, width: usize, height: usize) -> Option<Vec<u8>> {
    if width == 0 || height == 0 {
        return None;
    }
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_len = width * 3;
    if stride < row_len || data.len() < stride * (height - 1) + row_len {
        return None;
    }
    let mut out = Vec::with_capacity(row_len * height);
    for row in 0..height {
        let start = row * stride;
        out.extend_from_slice(&data[start..start + row_len]);
    }
    Some(out)
}
