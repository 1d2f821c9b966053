//! The text decoding state machine.
//!
//! A subbook's text stream interleaves encoded characters with escape
//! tokens. [`SubbookText`] owns the byte-stream provider and the loaded
//! search-index table; each [`SubbookText::read`] call seeks to a target,
//! builds a fresh [`DecodeContext`] and returns a [`TextIter`] that walks
//! the stream 2 bytes at a time, dispatching tokens through the static
//! registry and yielding every completed [`SectionNode`].
//!
//! Reads are independent and restartable: re-reading the same location
//! produces an identical section tree.

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use super::catalog::BookType;
use super::charset::{self, Encoding};
use super::error::{EbError, Result};
use super::handlers::Outcome;
use super::indices::{self, SearchKey, SearchTable, SebxaSettings};
use super::layout::RawRecord;
use super::registry::{self, Registry, Token, TokenKind, ESCAPE_CODE, KEYWORD_START_CODE};
use super::zio::Zio;

/// Decoded payload fields attached to a section node.
pub type SectionInfo = BTreeMap<&'static str, Value>;

/// A decoded payload value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    UInt(u64),
    Str(&'static str),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// A nesting span delimited by matching start/end tokens.
    Section,
    /// A single non-nesting token with inline payload.
    Directive,
}

/// One node of the decoded section tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNode {
    pub name: &'static str,
    pub kind: SectionKind,
    pub data: Vec<NodeItem>,
    pub info: SectionInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeItem {
    Text(String),
    Node(SectionNode),
}

impl SectionNode {
    fn new(name: &'static str, kind: SectionKind) -> Self {
        Self {
            name,
            kind,
            data: Vec::new(),
            info: SectionInfo::new(),
        }
    }

    /// Flattened text content of this node and all nested sections.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for item in &self.data {
            match item {
                NodeItem::Text(run) => out.push_str(run),
                NodeItem::Node(node) => out.push_str(&node.text()),
            }
        }
        out
    }
}

/// A main-text stop marker supplied by a subbook's appendix: the full
/// 2-byte escape pair plus the 2-byte value that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopCode {
    pub code: u16,
    pub following: u16,
}

/// Target and options for one `read` call.
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub page: u32,
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Absolute seek target; takes precedence over `search`.
    pub location: Option<Location>,
    /// Seek to a named search method's start page.
    pub search: Option<SearchKey>,
    /// Rewrite narrow-section text through the wide-to-narrow map on close.
    pub convert_narrow: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            location: None,
            search: None,
            convert_narrow: true,
        }
    }
}

impl ReadOptions {
    pub fn at(page: u32, offset: u32) -> Self {
        Self {
            location: Some(Location { page, offset }),
            ..Self::default()
        }
    }

    pub fn search(key: SearchKey) -> Self {
        Self {
            search: Some(key),
            ..Self::default()
        }
    }
}

/// Per-read mutable state. Created fresh by every `read` call and discarded
/// when its iterator is dropped.
pub struct DecodeContext {
    pub encoding: Encoding,
    pub is_epwing: bool,
    pub convert_narrow: bool,
    pub is_main_text: bool,
    pub appendix_stop: Option<StopCode>,
    pub printable_count: u64,
    pub auto_stop_code: Option<u16>,
    pub keyword_count: u64,
    /// Context-level flags set by handlers (e.g. `ebxac_gaiji`).
    pub info: SectionInfo,
    skip_code: Option<u8>,
    section_skip: Option<u8>,
    sections: Vec<SectionNode>,
    payload_buffers: HashMap<u8, Vec<u8>>,
}

impl DecodeContext {
    fn new(
        encoding: Encoding,
        is_epwing: bool,
        appendix_stop: Option<StopCode>,
        convert_narrow: bool,
    ) -> Self {
        Self {
            encoding,
            is_epwing,
            convert_narrow,
            is_main_text: true,
            appendix_stop,
            printable_count: 0,
            auto_stop_code: None,
            keyword_count: 0,
            info: SectionInfo::new(),
            skip_code: None,
            section_skip: None,
            sections: Vec::new(),
            payload_buffers: HashMap::new(),
        }
    }

    /// The main-text stop rule: with an appendix stop code the escape pair
    /// and its following value must both match; without one, only a keyword
    /// start matching the read's recorded auto-stop code stops the text.
    pub fn check_stop_code(&self, code: u16, following: u16) -> bool {
        match self.appendix_stop {
            Some(stop) => stop.code == code && stop.following == following,
            None => code == KEYWORD_START_CODE && self.auto_stop_code == Some(following),
        }
    }

    /// Whether a `narrow` section is currently open.
    pub fn narrow_open(&self) -> bool {
        self.sections.iter().any(|s| s.name == "narrow")
    }

    pub fn open_section_depth(&self) -> usize {
        self.sections.len()
    }

    fn suppressed(&self) -> bool {
        self.skip_code.is_some() || self.section_skip.is_some()
    }
}

/// A subbook's text-decoding session: the byte-stream provider plus the
/// search-index table loaded from its index page.
pub struct SubbookText<Z: Zio> {
    zio: Z,
    index_page: u32,
    encoding: Encoding,
    book_type: BookType,
    stop_code: Option<StopCode>,
    searches: SearchTable,
    sebxa: SebxaSettings,
}

impl<Z: Zio> SubbookText<Z> {
    /// Opens the provider and loads the search-index table from
    /// `index_page`.
    pub fn new(
        mut zio: Z,
        index_page: u32,
        encoding: Encoding,
        book_type: BookType,
    ) -> Result<Self> {
        // Fail fast on a drifted format table before touching the stream.
        registry::registry()?;

        zio.open()?;
        let is_plain = zio.is_plain();
        let (searches, sebxa) = indices::load(&mut zio, index_page, encoding, book_type, is_plain)?;

        Ok(Self {
            zio,
            index_page,
            encoding,
            book_type,
            stop_code: None,
            searches,
            sebxa,
        })
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn index_page(&self) -> u32 {
        self.index_page
    }

    pub fn searches(&self) -> &SearchTable {
        &self.searches
    }

    pub fn sebxa(&self) -> &SebxaSettings {
        &self.sebxa
    }

    /// Installs (or clears) the appendix-supplied main-text stop code.
    pub fn set_stop_code(&mut self, stop_code: Option<StopCode>) {
        self.stop_code = stop_code;
    }

    pub fn stream_position(&mut self) -> Result<u64> {
        self.zio.tell()
    }

    /// Starts a read at the requested target and returns an iterator over
    /// completed section nodes. Without a location or search key the read
    /// resumes at the current stream position.
    pub fn read(&mut self, options: &ReadOptions) -> Result<TextIter<'_, Z>> {
        if let Some(loc) = options.location {
            self.zio.seek_page(loc.page, loc.offset)?;
        } else if let Some(key) = options.search {
            let start_page = self
                .searches
                .get(key)
                .ok_or_else(|| EbError::NotFound(format!("search method {:?}", key)))?
                .start_page;
            debug!("Seeking start page of search {:?}", key);
            self.zio.seek_page(start_page, 0)?;
        }

        let ctx = DecodeContext::new(
            self.encoding,
            self.book_type == BookType::Epwing,
            self.stop_code,
            options.convert_narrow,
        );
        Ok(TextIter {
            zio: &mut self.zio,
            ctx,
            terminated: false,
        })
    }
}

/// Iterator over completed section nodes of one read.
///
/// Every section is yielded when its end token is consumed, nested ones
/// included (a nested section also appears inside its parent's data). The
/// iterator ends at a hard or soft stop, or at end of stream.
pub struct TextIter<'a, Z: Zio> {
    zio: &'a mut Z,
    ctx: DecodeContext,
    terminated: bool,
}

impl<'a, Z: Zio> TextIter<'a, Z> {
    /// The read's decode context, for inspecting counters and flags.
    pub fn context(&self) -> &DecodeContext {
        &self.ctx
    }

    fn handle_escape(&mut self, code: u8) -> Result<Option<SectionNode>> {
        // An armed skip code turns everything into filler until the exact
        // resume code reappears.
        if let Some(armed) = self.ctx.skip_code {
            if code == armed {
                self.ctx.skip_code = None;
            }
            return Ok(None);
        }

        let reg = registry::registry()?;

        // A discarded section's span is consumed silently through its
        // matching end token, payload included.
        if let Some(end_code) = self.ctx.section_skip {
            if code == end_code {
                if let Some(token) = reg.token(code) {
                    self.consume_payload_silently(token)?;
                }
                self.ctx.section_skip = None;
            }
            return Ok(None);
        }

        let Some(token) = reg.token(code) else {
            debug!("Unknown escape code {:#04x} treated as filler", code);
            return Ok(None);
        };

        match token.kind {
            TokenKind::Skip { resume } => {
                self.ctx.skip_code = Some(resume);
                Ok(None)
            }
            TokenKind::Start => self.dispatch_start(code, token, reg),
            TokenKind::Directive => self.dispatch_directive(code, token),
            TokenKind::End => self.dispatch_end(code, token),
        }
    }

    /// Reads the token's payload (if any), extracts its info fields, runs
    /// its handler and consumes the fixed trailing skip bytes.
    fn run_token(&mut self, code: u8, token: &Token) -> Result<(SectionInfo, Outcome)> {
        let mut info = SectionInfo::new();
        let mut outcome = Outcome::Continue;

        if let Some(layout) = token.layout {
            // The payload layout covers the escape pair already consumed,
            // so back up and read the whole record. Buffers are reused
            // across invocations of the same token.
            let mut buf = self.ctx.payload_buffers.remove(&code).unwrap_or_default();
            buf.resize(layout.size, 0);
            self.zio.seek_relative(-2)?;
            self.zio.read_into(&mut buf)?;

            {
                let rec = RawRecord::new(layout, &buf)?;
                if let Some(extract) = token.extract {
                    info = extract(&rec)?;
                }
            }
            if let Some(handler) = token.handler {
                outcome = handler(&mut self.ctx, &mut *self.zio, &info)?;
            }
            self.ctx.payload_buffers.insert(code, buf);
        } else if let Some(handler) = token.handler {
            outcome = handler(&mut self.ctx, &mut *self.zio, &info)?;
        }

        if token.skip_bytes != 0 && matches!(outcome, Outcome::Continue | Outcome::Skip) {
            self.zio.seek_relative(token.skip_bytes)?;
        }

        Ok((info, outcome))
    }

    fn consume_payload_silently(&mut self, token: &Token) -> Result<()> {
        if let Some(layout) = token.layout {
            self.zio.seek_relative(layout.size as i64 - 2)?;
        }
        if token.skip_bytes != 0 {
            self.zio.seek_relative(token.skip_bytes)?;
        }
        Ok(())
    }

    fn dispatch_start(
        &mut self,
        code: u8,
        token: &Token,
        reg: &Registry,
    ) -> Result<Option<SectionNode>> {
        let (info, outcome) = self.run_token(code, token)?;
        match outcome {
            Outcome::Continue => {
                let mut node = SectionNode::new(token.name, SectionKind::Section);
                node.info = info;
                self.ctx.sections.push(node);
            }
            Outcome::Skip => {
                debug!("Discarding degenerate {} section", token.name);
                match reg.end_code_for(token.name) {
                    Some(end_code) => self.ctx.section_skip = Some(end_code),
                    None => warn!("Discarded section {} has no end token", token.name),
                }
            }
            Outcome::SoftStop => {
                debug!("Reached text soft stop at {} start", token.name);
                self.terminated = true;
            }
            Outcome::HardStop => {
                debug!("Reached text hard stop at {} start", token.name);
                self.zio.seek_relative(-2)?;
                self.terminated = true;
            }
        }
        Ok(None)
    }

    fn dispatch_directive(&mut self, code: u8, token: &Token) -> Result<Option<SectionNode>> {
        let (info, outcome) = self.run_token(code, token)?;
        match outcome {
            Outcome::Continue => {
                let mut node = SectionNode::new(token.name, SectionKind::Directive);
                node.info = info;
                // Directives outside any open section are dropped.
                if let Some(top) = self.ctx.sections.last_mut() {
                    top.data.push(NodeItem::Node(node));
                }
            }
            Outcome::SoftStop | Outcome::Skip => {
                debug!("Reached text soft stop at {} directive", token.name);
                self.terminated = true;
            }
            Outcome::HardStop => {
                self.zio.seek_relative(-2)?;
                self.terminated = true;
            }
        }
        Ok(None)
    }

    fn dispatch_end(&mut self, code: u8, token: &Token) -> Result<Option<SectionNode>> {
        let mut node = match self.ctx.sections.pop() {
            Some(node) if node.name == token.name => node,
            Some(node) => {
                return Err(EbError::MalformedSection {
                    expected: node.name,
                    found: token.name,
                })
            }
            None => {
                return Err(EbError::MalformedSection {
                    expected: "<none>",
                    found: token.name,
                })
            }
        };

        let (info, outcome) = self.run_token(code, token)?;
        node.info.extend(info);

        if node.name == "keyword" {
            self.ctx.keyword_count += 1;
        }
        if node.name == "narrow" && self.ctx.convert_narrow {
            normalize_narrow(&mut node);
        }

        match outcome {
            Outcome::HardStop => {
                debug!("Reached text hard stop at {} end", token.name);
                self.zio.seek_relative(-2)?;
                self.terminated = true;
            }
            Outcome::SoftStop => {
                debug!("Reached text soft stop at {} end", token.name);
                self.terminated = true;
            }
            _ => {}
        }

        // The finished node becomes a child of its parent; top-level nodes
        // are handed to the caller outright.
        if let Some(parent) = self.ctx.sections.last_mut() {
            parent.data.push(NodeItem::Node(node.clone()));
        }
        Ok(Some(node))
    }

    fn decode_character(&mut self, unit: [u8; 2]) -> Result<()> {
        let ch = if self.ctx.encoding.is_single_byte() {
            // Single-byte text advances one byte at a time; the second
            // byte of the unit may itself be an escape lead.
            self.zio.seek_relative(-1)?;
            if !self.ctx.suppressed() && charset::is_latin_printable(unit[0]) {
                Some(char::from(unit[0]))
            } else {
                None
            }
        } else if self.ctx.suppressed() {
            None
        } else {
            charset::decode_pair(self.ctx.encoding, unit[0], unit[1], self.ctx.narrow_open())
        };

        if let Some(ch) = ch {
            self.ctx.printable_count += 1;
            if let Some(top) = self.ctx.sections.last_mut() {
                match top.data.last_mut() {
                    Some(NodeItem::Text(run)) => run.push(ch),
                    _ => top.data.push(NodeItem::Text(ch.to_string())),
                }
            }
        }
        Ok(())
    }
}

fn normalize_narrow(node: &mut SectionNode) {
    if node.data.len() == 1 {
        if let NodeItem::Text(run) = &node.data[0] {
            let converted = charset::to_narrow(run);
            node.data[0] = NodeItem::Text(converted);
            return;
        }
    }
    if !node.data.is_empty() {
        warn!("Narrow section holds more than a single text run; left unconverted");
    }
}

impl<'a, Z: Zio> Iterator for TextIter<'a, Z> {
    type Item = Result<SectionNode>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.terminated {
            return None;
        }

        loop {
            let mut unit = [0u8; 2];
            match self.zio.read_into(&mut unit) {
                Ok(()) => {}
                Err(e) if e.is_eof() => {
                    self.terminated = true;
                    return None;
                }
                Err(e) => {
                    self.terminated = true;
                    return Some(Err(e));
                }
            }

            if unit[0] == ESCAPE_CODE {
                match self.handle_escape(unit[1]) {
                    Ok(Some(node)) => return Some(Ok(node)),
                    Ok(None) => {
                        if self.terminated {
                            return None;
                        }
                    }
                    Err(e) => {
                        self.terminated = true;
                        return Some(Err(e));
                    }
                }
            } else if self.ctx.sections.is_empty() {
                // Outside any section bytes are discarded; put one byte
                // back so an escape starting mid-unit is not missed.
                if let Err(e) = self.zio.seek_relative(-1) {
                    self.terminated = true;
                    return Some(Err(e));
                }
            } else if let Err(e) = self.decode_character(unit) {
                self.terminated = true;
                return Some(Err(e));
            }
        }
    }
}
