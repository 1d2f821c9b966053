//! Token handlers and payload-info extractors.
//!
//! A handler is a plain function of (decode context, stream, decoded payload
//! info) run after the token's fixed-size payload has been read. Handlers
//! never unwind; the three non-local exits (soft stop, hard stop, skip) are
//! ordinary [`Outcome`] values the state machine acts on.

use log::debug;

use super::charset::Encoding;
use super::error::Result;
use super::layout::RawRecord;
use super::registry::{ESCAPE_CODE, KEYWORD_START_CODE, SET_INDENT_CODE};
use super::text::{DecodeContext, SectionInfo, Value};
use super::zio::Zio;

/// What the state machine should do after a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// Terminate the read cleanly, keeping everything decoded so far.
    SoftStop,
    /// Terminate immediately and rewind the stream by the token's width.
    HardStop,
    /// Discard the just-opened section; its span through the matching end
    /// token is consumed silently.
    Skip,
}

pub type ExtractFn = fn(&RawRecord) -> Result<SectionInfo>;
pub type HandlerFn = fn(&mut DecodeContext, &mut dyn Zio, &SectionInfo) -> Result<Outcome>;

fn info_uint(info: &SectionInfo, key: &str) -> u64 {
    match info.get(key) {
        Some(Value::UInt(v)) => *v,
        _ => 0,
    }
}

/// Peek the next 2-byte unit without consuming it. A short read reports
/// `None` rather than failing, since lookahead at end of stream is routine.
fn peek_unit(io: &mut dyn Zio) -> Result<Option<[u8; 2]>> {
    let mut unit = [0u8; 2];
    match io.read_into(&mut unit) {
        Ok(()) => {
            io.seek_relative(-2)?;
            Ok(Some(unit))
        }
        Err(e) if e.is_eof() => Ok(None),
        Err(e) => Err(e),
    }
}

/// EB discs do not delimit gaiji/emphasis regions the way EPWING does: when
/// the next unit is not an escape code, 4 bytes of inline data follow and
/// must be consumed here.
fn check_next_eb(ctx: &DecodeContext, io: &mut dyn Zio) -> Result<Outcome> {
    if !ctx.is_epwing {
        if let Some(unit) = peek_unit(io)? {
            if unit[0] >= ESCAPE_CODE {
                return Ok(Outcome::Continue);
            }
        }
    }
    io.seek_relative(4)?;
    Ok(Outcome::Continue)
}

pub fn text_end(_ctx: &mut DecodeContext, _io: &mut dyn Zio, _info: &SectionInfo) -> Result<Outcome> {
    Ok(Outcome::HardStop)
}

pub fn keyword_start(ctx: &mut DecodeContext, _io: &mut dyn Zio, info: &SectionInfo) -> Result<Outcome> {
    let stop_word = info_uint(info, "auto_stop_code") as u16;

    if ctx.printable_count > 0
        && ctx.is_main_text
        && ctx.check_stop_code(KEYWORD_START_CODE, stop_word)
    {
        return Ok(Outcome::SoftStop);
    }
    if ctx.auto_stop_code.is_none() {
        debug!("Auto stop code set to {:#06x}", stop_word);
        ctx.auto_stop_code = Some(stop_word);
    }
    Ok(Outcome::Continue)
}

pub fn set_indent(ctx: &mut DecodeContext, _io: &mut dyn Zio, info: &SectionInfo) -> Result<Outcome> {
    let indent = info_uint(info, "indent") as u16;
    if ctx.printable_count > 0 && ctx.is_main_text && ctx.check_stop_code(SET_INDENT_CODE, indent) {
        return Ok(Outcome::SoftStop);
    }
    Ok(Outcome::Continue)
}

pub fn reference_start(_ctx: &mut DecodeContext, io: &mut dyn Zio, info: &SectionInfo) -> Result<Outcome> {
    if info_uint(info, "arg_check") != 0 {
        // The trailing two bytes are not part of the structure.
        io.seek_relative(-2)?;
    }
    Ok(Outcome::Continue)
}

pub fn graphic_block_start(_ctx: &mut DecodeContext, io: &mut dyn Zio, info: &SectionInfo) -> Result<Outcome> {
    if matches!(info.get("arg_check"), Some(Value::Bool(false))) {
        io.seek_relative(-2)?;
    }
    Ok(Outcome::Continue)
}

pub fn mono_graphic_start(_ctx: &mut DecodeContext, _io: &mut dyn Zio, info: &SectionInfo) -> Result<Outcome> {
    if info_uint(info, "width") == 0 || info_uint(info, "height") == 0 {
        return Ok(Outcome::Skip);
    }
    Ok(Outcome::Continue)
}

pub fn paged_reference_start(_ctx: &mut DecodeContext, io: &mut dyn Zio, _info: &SectionInfo) -> Result<Outcome> {
    if let Some(unit) = peek_unit(io)? {
        if unit == [ESCAPE_CODE, 0x6b] {
            io.seek_relative(-2)?;
            return Ok(Outcome::SoftStop);
        }
    }
    Ok(Outcome::Continue)
}

pub fn decoration_start(ctx: &mut DecodeContext, io: &mut dyn Zio, info: &SectionInfo) -> Result<Outcome> {
    let first_payload_byte = (info_uint(info, "decoration_code") >> 8) as u8;
    if !ctx.is_epwing && first_payload_byte >= ESCAPE_CODE {
        io.seek_relative(-2)?;
    }
    Ok(Outcome::Continue)
}

pub fn gaiji_boundary(ctx: &mut DecodeContext, io: &mut dyn Zio, _info: &SectionInfo) -> Result<Outcome> {
    if ctx.encoding == Encoding::JisX0208Gb2312 {
        ctx.info.insert("ebxac_gaiji", Value::Bool(true));
        Ok(Outcome::Continue)
    } else {
        check_next_eb(ctx, io)
    }
}

pub fn emphasis_directive(ctx: &mut DecodeContext, io: &mut dyn Zio, _info: &SectionInfo) -> Result<Outcome> {
    check_next_eb(ctx, io)
}

// Info extractors: pull the named payload fields out of a raw record and
// surface them on the section node.

pub fn extract_page_offset(rec: &RawRecord) -> Result<SectionInfo> {
    let page = rec.bcd("page")?;
    let offset = rec.bcd("offset")?;
    let mut info = SectionInfo::new();
    info.insert("page", Value::UInt(page));
    info.insert("offset", Value::UInt(offset));
    info.insert("is_leaf", Value::Bool(page == 0 && offset == 0));
    Ok(info)
}

pub fn extract_set_indent(rec: &RawRecord) -> Result<SectionInfo> {
    let mut info = SectionInfo::new();
    info.insert("indent", Value::UInt(rec.uint("indent")?));
    Ok(info)
}

pub fn extract_keyword(rec: &RawRecord) -> Result<SectionInfo> {
    let mut info = SectionInfo::new();
    info.insert("auto_stop_code", Value::UInt(rec.uint("auto_stop_code")?));
    Ok(info)
}

pub fn extract_reference(rec: &RawRecord) -> Result<SectionInfo> {
    let mut info = SectionInfo::new();
    info.insert("arg_check", Value::UInt(rec.uint("arg_check")?));
    Ok(info)
}

pub fn extract_graphic_block(rec: &RawRecord) -> Result<SectionInfo> {
    let mut info = SectionInfo::new();
    // A leading escape byte means the record is not actually present.
    info.insert(
        "arg_check",
        Value::Bool(rec.bytes("arg1")?[0] != ESCAPE_CODE),
    );
    info.insert("arg1", Value::UInt(rec.bcd("arg1")?));
    Ok(info)
}

pub fn extract_mono_graphic(rec: &RawRecord) -> Result<SectionInfo> {
    let mut info = SectionInfo::new();
    info.insert("width", Value::UInt(rec.bcd("width")?));
    info.insert("height", Value::UInt(rec.bcd("height")?));
    Ok(info)
}

pub fn extract_wave_sound(rec: &RawRecord) -> Result<SectionInfo> {
    let mut info = SectionInfo::new();
    info.insert("start_page", Value::UInt(rec.bcd("start_page")?));
    info.insert("start_offset", Value::UInt(rec.bcd("start_offset")?));
    info.insert("end_page", Value::UInt(rec.bcd("end_page")?));
    info.insert("end_offset", Value::UInt(rec.bcd("end_offset")?));
    Ok(info)
}

pub fn extract_graphic(rec: &RawRecord) -> Result<SectionInfo> {
    let mut info = SectionInfo::new();
    let image_type = if rec.uint("type_info")? >> 8 == 0 {
        "bmp"
    } else {
        "jpeg"
    };
    info.insert("image_type", Value::Str(image_type));
    info.insert("page", Value::UInt(rec.bcd("page")?));
    info.insert("offset", Value::UInt(rec.bcd("offset")?));
    Ok(info)
}

pub fn extract_clickable(rec: &RawRecord) -> Result<SectionInfo> {
    let mut info = SectionInfo::new();
    info.insert("x", Value::UInt(rec.bcd("x")?));
    info.insert("y", Value::UInt(rec.bcd("y")?));
    info.insert("width", Value::UInt(rec.bcd("width")?));
    info.insert("height", Value::UInt(rec.bcd("height")?));
    info.insert("page", Value::UInt(rec.bcd("page")?));
    info.insert("offset", Value::UInt(rec.bcd("offset")?));
    Ok(info)
}

pub fn extract_decoration(rec: &RawRecord) -> Result<SectionInfo> {
    let code = rec.uint("decoration_code")?;
    let decoration_type = match code {
        1 => "italic",
        3 => "bold",
        _ => "unknown",
    };
    let mut info = SectionInfo::new();
    info.insert("decoration_code", Value::UInt(code));
    info.insert("decoration_type", Value::Str(decoration_type));
    Ok(info)
}
