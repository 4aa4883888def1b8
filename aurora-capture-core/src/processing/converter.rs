//! Sample-rate and channel conversion toward the mixdown target format.
//!
//! Everything works on interleaved `f32` and is streaming: buffers can be fed
//! in arbitrary chunk sizes and the concatenated output equals a one-shot
//! conversion of the whole input.

/// Channel layout policy: mono is duplicated to stereo, stereo is averaged to
/// mono, and every other combination passes through unchanged.
pub fn convert_channels(samples: &[f32], source_channels: u16, target_channels: u16) -> Vec<f32> {
    match (source_channels, target_channels) {
        (1, 2) => upmix_mono(samples),
        (2, 1) => downmix_to_mono(samples, 2),
        _ => samples.to_vec(),
    }
}

/// Channel count produced by [`convert_channels`].
pub fn converted_channel_count(source_channels: u16, target_channels: u16) -> u16 {
    match (source_channels, target_channels) {
        (1, 2) => 2,
        (2, 1) => 1,
        _ => source_channels,
    }
}

/// Duplicate each mono sample into both channels of a stereo frame.
pub fn upmix_mono(samples: &[f32]) -> Vec<f32> {
    let mut stereo = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        stereo.push(sample);
        stereo.push(sample);
    }
    stereo
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Streaming linear-interpolation resampler for interleaved audio.
///
/// Output frame `i` is read at source position `i * source_rate / target_rate`,
/// interpolating between the two neighbouring frames. After [`finish`](Self::finish)
/// exactly `floor(input_frames * target_rate / source_rate)` frames have been
/// produced; frames past the last source frame hold its value.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    channels: usize,
    ratio: f64,
    step: f64,
    pending: Vec<f32>,
    /// Absolute index of the first frame in `pending`.
    base_frame: u64,
    frames_out: u64,
}

impl LinearResampler {
    pub fn new(source_rate: u32, target_rate: u32, channels: u16) -> Self {
        let ratio = target_rate as f64 / source_rate as f64;
        Self {
            channels: channels.max(1) as usize,
            ratio,
            step: 1.0 / ratio,
            pending: Vec::new(),
            base_frame: 0,
            frames_out: 0,
        }
    }

    /// Feed interleaved input and collect every output frame that can be interpolated so far.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let ch = self.channels;
        // A trailing partial frame stays in `pending` until the next call completes it.
        self.pending.extend_from_slice(input);

        let available = (self.pending.len() / ch) as u64;
        let mut output = Vec::new();
        loop {
            let source_index = self.frames_out as f64 * self.step;
            let index = source_index as u64;
            if index + 1 >= self.base_frame + available {
                break;
            }
            let local = (index - self.base_frame) as usize;
            let fraction = (source_index - index as f64) as f32;
            for c in 0..ch {
                let a = self.pending[local * ch + c];
                let b = self.pending[(local + 1) * ch + c];
                output.push(a * (1.0 - fraction) + b * fraction);
            }
            self.frames_out += 1;
        }

        // Drop frames no future output can reference.
        let next_index = (self.frames_out as f64 * self.step) as u64;
        let consumed = next_index.saturating_sub(self.base_frame).min(available) as usize;
        if consumed > 0 {
            self.pending.drain(..consumed * ch);
            self.base_frame += consumed as u64;
        }
        output
    }

    /// Emit the tail frames once the input is exhausted.
    pub fn finish(&mut self) -> Vec<f32> {
        let ch = self.channels;
        let available = (self.pending.len() / ch) as u64;
        let expected = ((self.base_frame + available) as f64 * self.ratio) as u64;
        let mut output = Vec::new();

        while self.frames_out < expected {
            let source_index = self.frames_out as f64 * self.step;
            let index = source_index as u64;
            if index < self.base_frame || index >= self.base_frame + available {
                break;
            }
            let local = (index - self.base_frame) as usize;
            let fraction = (source_index - index as f64) as f32;
            for c in 0..ch {
                let a = self.pending[local * ch + c];
                let sample = if index + 1 < self.base_frame + available {
                    a * (1.0 - fraction) + self.pending[(local + 1) * ch + c] * fraction
                } else {
                    a
                };
                output.push(sample);
            }
            self.frames_out += 1;
        }

        self.pending.clear();
        output
    }

    pub fn frames_out(&self) -> u64 {
        self.frames_out
    }
}

/// Converts one captured stream to the mixdown target format.
///
/// Channel conversion runs first, then resampling.
#[derive(Debug, Clone)]
pub struct StreamConverter {
    source_channels: u16,
    target_channels: u16,
    resampler: Option<LinearResampler>,
}

impl StreamConverter {
    pub fn new(source_rate: u32, source_channels: u16, target_rate: u32, target_channels: u16) -> Self {
        let out_channels = converted_channel_count(source_channels, target_channels);
        let resampler = if source_rate == target_rate {
            None
        } else {
            Some(LinearResampler::new(source_rate, target_rate, out_channels))
        };
        Self {
            source_channels,
            target_channels,
            resampler,
        }
    }

    /// Whether the source needs no conversion at all.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none() && converted_channel_count(self.source_channels, self.target_channels) == self.source_channels
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let converted = convert_channels(samples, self.source_channels, self.target_channels);
        match self.resampler.as_mut() {
            Some(resampler) => resampler.process(&converted),
            None => converted,
        }
    }

    pub fn finish(&mut self) -> Vec<f32> {
        match self.resampler.as_mut() {
            Some(resampler) => resampler.finish(),
            None => Vec::new(),
        }
    }
}
