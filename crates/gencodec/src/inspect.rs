//! Human-readable dumps of encoded streams.
//!
//! [`dump`] walks a stream using only the byte codes, so it can render any
//! well-formed message, and uses the registry to annotate what it knows:
//! type names from the metadata, struct field names from the codecs'
//! field lists, and element types from the handles each codec resolved
//! when the registry was built.
//!
//! ```text
//! message 0: 19 bytes
//!   types: [0] app::Point
//!   track_pointers: false
//!   value: any #0 app::Point
//!     struct app::Point
//!       x: 3
//!       y: -1
//! ```

use std::fmt::Write as _;

use crate::{
    codec::Shape,
    config::DecodeOptions,
    decode::Decoder,
    error::{Error, Result},
    registry::{CodecId, Registry},
    wire::{
        self, END, MAGIC, N_BYTES, N_VALUES, NIL, PTR, REF, REF_PTR, START,
    },
};

/// Renders every message of `stream`.
///
/// # Errors
///
/// Fails on a bad header, a truncated frame, or a malformed payload.
pub fn dump(registry: &Registry, stream: &[u8]) -> Result<String> {
    let mut out = String::new();
    if stream.is_empty() {
        return Ok(out);
    }

    let Some(rest) = stream.strip_prefix(&MAGIC) else {
        let mut found = [0; 4];
        let len = stream.len().min(4);
        found[..len].copy_from_slice(&stream[..len]);
        return Err(Error::BadHeader { found });
    };

    let mut inspector = Inspector {
        registry,
        decoder: Decoder::new(registry, DecodeOptions::default()),
        types: Vec::new(),
        out: &mut out,
    };

    let mut rest = rest;
    let mut index = 0;
    while !rest.is_empty() {
        let (size, body) = rest
            .split_first_chunk::<8>()
            .ok_or(Error::TruncatedStream)?;
        let size = usize::try_from(u64::from_le_bytes(*size))
            .map_err(|_| Error::TruncatedStream)?;
        if size > body.len() {
            return Err(Error::TruncatedStream);
        }

        let (message, tail) = body.split_at(size);
        inspector.message(index, message)?;
        rest = tail;
        index += 1;
    }

    Ok(out)
}

struct Inspector<'r, 'o> {
    registry: &'r Registry,
    decoder: Decoder<'r>,
    types: Vec<CodecId>,
    out: &'o mut String,
}

impl Inspector<'_, '_> {
    fn line(&mut self, depth: usize, text: std::fmt::Arguments<'_>) {
        let _ = writeln!(self.out, "{:width$}{text}", "", width = depth * 2);
    }

    fn message(&mut self, index: usize, message: &[u8]) -> Result<()> {
        self.decoder.load_payload(message);
        self.line(0, format_args!("message {index}: {} bytes", message.len()));

        let count = self.decoder.start_list()?.unwrap_or(0);
        self.types.clear();
        let mut names = Vec::with_capacity(count);
        for number in 0..count {
            let name = self.decoder.decode_string()?;
            let id = self.registry.lookup_name(&name).ok_or_else(|| {
                Error::UnregisteredType { name: name.clone() }
            })?;
            names.push(format!("[{number}] {name}"));
            self.types.push(id);
        }
        let tracked = self.decoder.decode_bool()?;

        self.line(1, format_args!("types: {}", names.join(", ")));
        self.line(1, format_args!("track_pointers: {tracked}"));
        self.any(1, "value: ")
    }

    fn any(&mut self, depth: usize, label: &str) -> Result<()> {
        if self.decoder.peek_byte()? == 0 {
            self.decoder.read_byte()?;
            self.line(depth, format_args!("{label}nil"));
            return Ok(());
        }

        self.decoder.expect_list(2)?;
        let number = self.decoder.decode_uint()?;
        let id = usize::try_from(number)
            .ok()
            .and_then(|index| self.types.get(index))
            .copied()
            .ok_or(Error::TypeNumberOutOfRange {
                number,
                len: self.types.len(),
            })?;

        let name = self.registry.stable_name(id);
        self.line(depth, format_args!("{label}any #{number} {name}"));
        self.value(depth + 1, "", Some(id))
    }

    /// Looks through codecs that add nothing to the encoding.
    fn resolve(&self, mut codec: Option<CodecId>) -> Option<CodecId> {
        while let Some(id) = codec {
            let inner = self.registry.codec(id);
            if inner.shape() != Shape::Transparent {
                break;
            }
            codec = inner.linked().first().copied().flatten();
        }
        codec
    }

    fn value(
        &mut self,
        depth: usize,
        label: &str,
        codec: Option<CodecId>,
    ) -> Result<()> {
        let codec = self.resolve(codec);
        let shape = codec.map(|id| self.registry.codec(id).shape());
        let code = self.decoder.peek_byte()?;

        if shape == Some(Shape::Dynamic) {
            return self.any(depth, label);
        }
        if let Some(id) = codec
            && shape == Some(Shape::Scalar)
            && code != NIL
            && self.scalar(depth, label, id)?
        {
            return Ok(());
        }

        let offset = self.decoder.offset();
        self.decoder.enter()?;
        match code {
            code if code < END => {
                self.decoder.read_byte()?;
                self.line(depth, format_args!("{label}{code}"));
            }
            NIL => {
                self.decoder.read_byte()?;
                self.line(depth, format_args!("{label}nil"));
            }
            PTR | REF_PTR => {
                self.decoder.read_byte()?;
                let child = match shape {
                    Some(Shape::Pointer) => self.linked(codec, 0),
                    _ => codec,
                };
                if code == PTR {
                    self.line(depth, format_args!("{label}ptr"));
                } else {
                    self.line(depth, format_args!("{label}ptr @{offset}"));
                }
                self.value(depth + 1, "", child)?;
            }
            REF => {
                self.decoder.read_byte()?;
                let distance = self.decoder.decode_uint()?;
                let target = usize::try_from(distance)
                    .ok()
                    .and_then(|distance| offset.checked_sub(distance))
                    .ok_or(Error::DanglingRef { offset })?;
                self.line(depth, format_args!("{label}ref -> @{target}"));
            }
            START => self.structure(depth, label, codec, shape)?,
            N_VALUES => self.list(depth, label, codec, shape)?,
            code if code == N_BYTES || wire::inline_len(code).is_some() => {
                let bytes = self.decoder.decode_bytes_ref()?;
                let text = render_bytes(bytes);
                self.line(depth, format_args!("{label}{text}"));
            }
            code => return Err(Error::BadCode { code, offset }),
        }
        self.decoder.leave();
        Ok(())
    }

    fn linked(&self, codec: Option<CodecId>, index: usize) -> Option<CodecId> {
        let linked = self.registry.codec(codec?).linked();
        if linked.is_empty() {
            return None;
        }
        linked.get(index % linked.len()).copied().flatten()
    }

    fn type_suffix(&self, codec: Option<CodecId>) -> String {
        codec
            .map(|id| format!(" {}", self.registry.stable_name(id)))
            .unwrap_or_default()
    }

    fn structure(
        &mut self,
        depth: usize,
        label: &str,
        codec: Option<CodecId>,
        shape: Option<Shape>,
    ) -> Result<()> {
        let codec = codec.filter(|_| shape == Some(Shape::Struct));
        self.decoder.start_struct()?;
        let suffix = self.type_suffix(codec);
        self.line(depth, format_args!("{label}struct{suffix}"));

        while let Some(slot) = self.decoder.next_field()? {
            let name = codec
                .zip(usize::try_from(slot).ok())
                .and_then(|(id, slot)| {
                    self.registry.codec(id).field_names().get(slot).copied()
                })
                .filter(|name| !name.is_empty());

            let label = match name {
                Some(name) => format!("{name}: "),
                None => format!("#{slot}: "),
            };
            let child = codec.zip(usize::try_from(slot).ok()).and_then(
                |(id, slot)| {
                    self.registry.codec(id).linked().get(slot).copied().flatten()
                },
            );
            self.value(depth + 1, &label, child)?;
        }
        Ok(())
    }

    fn list(
        &mut self,
        depth: usize,
        label: &str,
        codec: Option<CodecId>,
        shape: Option<Shape>,
    ) -> Result<()> {
        let len = self.decoder.start_list()?.unwrap_or(0);

        if shape == Some(Shape::Variant) && len == 2 {
            let variant = self.decoder.decode_uint()?;
            let suffix = self.type_suffix(codec);
            self.line(depth, format_args!("{label}variant {variant}{suffix}"));
            return self.value(depth + 1, "", None);
        }

        let codec = codec.filter(|_| shape == Some(Shape::Sequence));
        let suffix = self.type_suffix(codec);
        self.line(depth, format_args!("{label}list({len}){suffix}"));
        for index in 0..len {
            let child = self.linked(codec, index);
            self.value(depth + 1, &format!("[{index}] "), child)?;
        }
        Ok(())
    }

    /// Renders a built-in scalar with its proper decoding. Returns `false`
    /// for scalars it does not know.
    fn scalar(
        &mut self,
        depth: usize,
        label: &str,
        id: CodecId,
    ) -> Result<bool> {
        let text = match self.registry.stable_name(id) {
            "u8" | "u16" | "u32" | "u64" | "usize" => {
                self.decoder.decode_uint()?.to_string()
            }
            "i8" | "i16" | "i32" | "i64" | "isize" => {
                self.decoder.decode_int()?.to_string()
            }
            "f32" | "f64" => format!("{:?}", self.decoder.decode_float()?),
            "bool" => self.decoder.decode_bool()?.to_string(),
            "char" => format!("{:?}", self.decoder.decode::<char>()?),
            "string" => format!("{:?}", self.decoder.decode_str()?),
            "bytes" => render_bytes(self.decoder.decode_bytes_ref()?),
            _ => return Ok(false),
        };
        self.line(depth, format_args!("{label}{text}"));
        Ok(true)
    }
}

fn render_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.chars().any(char::is_control) => format!("{text:?}"),
        _ => {
            let hex: Vec<String> =
                bytes.iter().map(|byte| format!("{byte:02x}")).collect();
            format!("bytes[{}] {}", bytes.len(), hex.join(" "))
        }
    }
}
