//! Recursive-descent parser turning template source into [`Template`] nodes.
//!
//! Directives that sit alone on a line (`#set`, `#if`, `#else`, `#end` and
//! friends) swallow the line's indentation and trailing newline, so block
//! structure does not leak blank lines into the output.

mod expr;

use std::sync::Arc;

use crate::ast::{
    Expr, MacroCall, MacroDef, Node, Position, Reference, Segment, SetTarget, Template,
};
use crate::error::{Location, ParseError};

/// Parses `source` into a template named `name`.
///
/// Blocks, expressions and string interpolations together may nest at most
/// `max_depth` levels deep.
pub(crate) fn parse(name: &str, source: &str, max_depth: usize) -> Result<Template, ParseError> {
    let line_starts = line_starts(source);
    let mut parser = Parser::new(name, source, &line_starts, max_depth);
    let (nodes, end, at) = parser.parse_nodes()?;
    if let Some(keyword) = end.keyword() {
        return Err(parser.error_at(at, format!("unexpected {keyword} without an open block")));
    }
    Ok(Template {
        name: name.to_owned(),
        nodes,
        macros: parser.macros,
    })
}

fn line_starts(source: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(source.match_indices('\n').map(|(index, _)| index + 1))
        .collect()
}

/// How a node sequence ended.
enum BlockEnd {
    Eof,
    End,
    Else,
    ElseIf(Expr),
}

impl BlockEnd {
    const fn keyword(&self) -> Option<&'static str> {
        match self {
            Self::Eof => None,
            Self::End => Some("#end"),
            Self::Else => Some("#else"),
            Self::ElseIf(_) => Some("#elseif"),
        }
    }
}

pub(crate) struct Parser<'a> {
    name: &'a str,
    src: &'a str,
    pos: usize,
    end: usize,
    line_starts: &'a [usize],
    in_string: bool,
    depth: usize,
    max_depth: usize,
    macros: Vec<Arc<MacroDef>>,
}

impl<'a> Parser<'a> {
    const fn new(name: &'a str, src: &'a str, line_starts: &'a [usize], max_depth: usize) -> Self {
        Self {
            name,
            src,
            pos: 0,
            end: src.len(),
            line_starts,
            in_string: false,
            depth: 0,
            max_depth,
            macros: Vec::new(),
        }
    }

    /// Parser over `src[start..end]`, the body of a double-quoted string.
    const fn string_body(&self, start: usize, end: usize) -> Self {
        Self {
            name: self.name,
            src: self.src,
            pos: start,
            end,
            line_starts: self.line_starts,
            in_string: true,
            depth: self.depth,
            max_depth: self.max_depth,
            macros: Vec::new(),
        }
    }

    fn rest(&self) -> &'a str {
        self.slice(self.pos, self.end)
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        self.src.get(start..end).unwrap_or_default()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, expected: &str) -> bool {
        if self.rest().starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        if self.eat(expected) {
            return Ok(());
        }
        let found = self
            .peek()
            .map_or_else(|| "end of input".to_owned(), |ch| format!("'{ch}'"));
        Err(self.error_at(self.pos, format!("expected '{expected}' but found {found}")))
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn skip_inline_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.bump();
        }
    }

    fn identifier(&mut self) -> Option<String> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        let (_, first) = chars.next()?;
        if !is_ident_start(first) {
            return None;
        }
        let len = chars
            .find(|&(_, ch)| !is_ident_char(ch))
            .map_or(rest.len(), |(index, _)| index);
        self.pos += len;
        rest.get(..len).map(str::to_owned)
    }

    fn position_at(&self, offset: usize) -> Position {
        let line_index = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts.get(line_index).copied().unwrap_or(0);
        let column = self
            .src
            .get(line_start..offset)
            .map_or(0, |prefix| prefix.chars().count());
        Position {
            line: u32::try_from(line_index + 1).unwrap_or(u32::MAX),
            column: u32::try_from(column + 1).unwrap_or(u32::MAX),
        }
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> ParseError {
        let Position { line, column } = self.position_at(offset);
        ParseError {
            message: message.into(),
            location: Location::new(self.name, line, column),
        }
    }

    /// Runs `parse` one nesting level deeper, failing at `offset` once the
    /// limit is reached.
    fn nested<T>(
        &mut self,
        offset: usize,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= self.max_depth {
            return Err(self.error_at(
                offset,
                format!("nesting deeper than {} levels", self.max_depth),
            ));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn parse_nodes(&mut self) -> Result<(Vec<Node>, BlockEnd, usize), ParseError> {
        self.nested(self.pos, Self::node_sequence)
    }

    fn node_sequence(&mut self) -> Result<(Vec<Node>, BlockEnd, usize), ParseError> {
        let mut nodes = Vec::new();
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            match ch {
                '\\' => self.parse_escape(&mut text),
                '"' if self.in_string && self.peek_nth(1) == Some('"') => {
                    text.push('"');
                    self.pos += 2;
                }
                '$' => match self.try_reference()? {
                    Some(reference) => {
                        flush(&mut text, &mut nodes);
                        nodes.push(Node::Reference(reference));
                    }
                    None => {
                        text.push('$');
                        self.pos += 1;
                    }
                },
                '#' => {
                    let start = self.pos;
                    if let Some(end) = self.parse_hash(&mut text, &mut nodes)? {
                        flush(&mut text, &mut nodes);
                        return Ok((nodes, end, start));
                    }
                }
                _ => {
                    text.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        flush(&mut text, &mut nodes);
        Ok((nodes, BlockEnd::Eof, self.pos))
    }

    fn parse_escape(&mut self, text: &mut String) {
        let rest = self.rest();
        let count = rest.chars().take_while(|&ch| ch == '\\').count();
        let escaped_text = rest.get(..count).unwrap_or_default();
        let next = rest.get(count..).and_then(|tail| tail.chars().next());
        if self.in_string && count == 1 && next == Some('"') {
            text.push('"');
            self.pos += 2;
            return;
        }
        match next {
            Some(escaped @ ('$' | '#')) => {
                text.extend(std::iter::repeat_n('\\', count.div_euclid(2)));
                self.pos += count;
                if !count.is_multiple_of(2) {
                    text.push(escaped);
                    self.pos += 1;
                }
            }
            _ => {
                text.push_str(escaped_text);
                self.pos += count;
            }
        }
    }

    /// Parses a `$` reference at the cursor, or rewinds and returns `None`
    /// when the `$` does not start one.
    fn try_reference(&mut self) -> Result<Option<Reference>, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let quiet = self.eat('!');
        let braced = self.eat('{');
        let Some(name) = self.identifier() else {
            self.pos = start;
            return Ok(None);
        };

        let mut segments = Vec::new();
        loop {
            if self.peek() == Some('.') && self.peek_nth(1).is_some_and(is_ident_start) {
                self.pos += 1;
                let Some(member) = self.identifier() else {
                    return Err(self.error_at(self.pos, "expected property name"));
                };
                if self.eat('(') {
                    let args = self.call_args(')')?;
                    segments.push(Segment::Method { name: member, args });
                } else {
                    segments.push(Segment::Property(member));
                }
            } else if self.eat('[') {
                self.skip_ws();
                let index = self.expression()?;
                self.skip_ws();
                self.expect(']')?;
                segments.push(Segment::Index(index));
            } else {
                break;
            }
        }

        if braced && !self.eat('}') {
            return Err(self.error_at(start, "unterminated ${...} reference"));
        }
        Ok(Some(Reference {
            quiet,
            name,
            segments,
            source: self.slice(start, self.pos).to_owned(),
            pos: self.position_at(start),
        }))
    }

    /// Handles a `#` at the cursor. Returns the block terminator when one is
    /// found; everything else is appended to `text` or `nodes`.
    fn parse_hash(
        &mut self,
        text: &mut String,
        nodes: &mut Vec<Node>,
    ) -> Result<Option<BlockEnd>, ParseError> {
        let start = self.pos;
        let rest = self.rest();
        if rest.starts_with("##") {
            self.pos += rest.find('\n').map_or(rest.len(), |index| index + 1);
            return Ok(None);
        }
        if rest.starts_with("#*") {
            let Some(close) = rest.get(2..).and_then(|body| body.find("*#")) else {
                return Err(self.error_at(start, "unterminated #* comment"));
            };
            self.pos += close + 4;
            return Ok(None);
        }
        if let Some(body) = rest.strip_prefix("#[[") {
            let Some(close) = body.find("]]#") else {
                return Err(self.error_at(start, "unterminated #[[ block"));
            };
            text.push_str(body.get(..close).unwrap_or_default());
            self.pos += close + 6;
            return Ok(None);
        }

        self.pos += 1;
        let block_call = self.eat('@');
        let braced = !block_call && self.eat('{');
        let name = match self.identifier() {
            Some(name) if !braced || self.eat('}') => name,
            _ => {
                self.pos = start + 1;
                text.push('#');
                return Ok(None);
            }
        };

        if block_call {
            flush(text, nodes);
            let call = self.parse_macro_call(name, start, true)?;
            nodes.push(Node::MacroCall(call));
            return Ok(None);
        }

        match name.as_str() {
            "set" => {
                let pos = self.position_at(start);
                let (target, value) = self.parse_set()?;
                self.gobble_line(start, text);
                flush(text, nodes);
                nodes.push(Node::Set { target, value, pos });
            }
            "if" => {
                let condition = self.parenthesised()?;
                self.gobble_line(start, text);
                flush(text, nodes);
                nodes.push(self.parse_if(condition, start)?);
            }
            "elseif" => {
                let condition = self.parenthesised()?;
                self.gobble_line(start, text);
                return Ok(Some(BlockEnd::ElseIf(condition)));
            }
            "else" => {
                self.gobble_line(start, text);
                return Ok(Some(BlockEnd::Else));
            }
            "end" => {
                self.gobble_line(start, text);
                return Ok(Some(BlockEnd::End));
            }
            "foreach" => {
                let pos = self.position_at(start);
                let (variable, iterable) = self.parse_foreach_header()?;
                self.gobble_line(start, text);
                flush(text, nodes);
                let (body, otherwise) = self.parse_loop_body(start)?;
                nodes.push(Node::Foreach {
                    variable,
                    iterable,
                    body,
                    otherwise,
                    pos,
                });
            }
            "macro" => {
                let definition = self.parse_macro_definition(start, text)?;
                self.macros.push(Arc::new(definition));
            }
            "parse" | "include" => {
                let pos = self.position_at(start);
                let target = self.parenthesised()?;
                flush(text, nodes);
                nodes.push(if name == "parse" {
                    Node::Parse { target, pos }
                } else {
                    Node::Include { target, pos }
                });
            }
            "break" | "stop" => {
                self.gobble_line(start, text);
                flush(text, nodes);
                nodes.push(if name == "break" { Node::Break } else { Node::Stop });
            }
            _ => {
                let after_name = self.pos;
                self.skip_inline_ws();
                if self.peek() == Some('(') {
                    flush(text, nodes);
                    let call = self.parse_macro_call(name, start, false)?;
                    nodes.push(Node::MacroCall(call));
                } else {
                    self.pos = after_name;
                    text.push_str(self.slice(start, after_name));
                }
            }
        }
        Ok(None)
    }

    /// Removes a directive's line when nothing else shares it.
    fn gobble_line(&mut self, directive_start: usize, text: &mut String) {
        if self.in_string {
            return;
        }
        let line_start = self
            .slice(0, directive_start)
            .rfind('\n')
            .map_or(0, |index| index + 1);
        let prefix_blank = self
            .slice(line_start, directive_start)
            .chars()
            .all(|ch| matches!(ch, ' ' | '\t'));
        let rest = self.rest();
        let line_len = rest.find('\n').unwrap_or(rest.len());
        let suffix_blank = rest
            .get(..line_len)
            .unwrap_or_default()
            .chars()
            .all(|ch| matches!(ch, ' ' | '\t' | '\r'));
        if !(prefix_blank && suffix_blank) {
            return;
        }
        self.pos += if line_len < rest.len() {
            line_len + 1
        } else {
            line_len
        };
        let kept = text.trim_end_matches([' ', '\t']).len();
        text.truncate(kept);
    }

    fn parenthesised(&mut self) -> Result<Expr, ParseError> {
        self.skip_inline_ws();
        self.expect('(')?;
        self.skip_ws();
        let expr = self.expression()?;
        self.skip_ws();
        self.expect(')')?;
        Ok(expr)
    }

    fn parse_set(&mut self) -> Result<(SetTarget, Expr), ParseError> {
        self.skip_inline_ws();
        self.expect('(')?;
        self.skip_ws();
        self.expect('$')?;
        let braced = self.eat('{');
        let Some(name) = self.identifier() else {
            return Err(self.error_at(self.pos, "expected variable name in #set"));
        };
        let mut path = Vec::new();
        while self.eat('.') {
            let Some(property) = self.identifier() else {
                return Err(self.error_at(self.pos, "expected property name in #set"));
            };
            path.push(property);
        }
        if braced {
            self.expect('}')?;
        }
        self.skip_ws();
        self.expect('=')?;
        self.skip_ws();
        let value = self.expression()?;
        self.skip_ws();
        self.expect(')')?;
        Ok((SetTarget { name, path }, value))
    }

    fn parse_if(&mut self, first: Expr, start: usize) -> Result<Node, ParseError> {
        let mut branches = Vec::new();
        let mut condition = first;
        loop {
            let (body, end, _) = self.parse_nodes()?;
            branches.push((condition, body));
            match end {
                BlockEnd::ElseIf(next) => condition = next,
                BlockEnd::End => {
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                    });
                }
                BlockEnd::Else => {
                    let (otherwise, closing, at) = self.parse_nodes()?;
                    return match closing {
                        BlockEnd::End => Ok(Node::If {
                            branches,
                            otherwise: Some(otherwise),
                        }),
                        BlockEnd::Eof => Err(self.error_at(start, "#if is missing its #end")),
                        BlockEnd::Else | BlockEnd::ElseIf(_) => {
                            Err(self.error_at(at, "#else must be the last branch of #if"))
                        }
                    };
                }
                BlockEnd::Eof => {
                    return Err(self.error_at(start, "#if is missing its #end"));
                }
            }
        }
    }

    fn parse_foreach_header(&mut self) -> Result<(String, Expr), ParseError> {
        self.skip_inline_ws();
        self.expect('(')?;
        self.skip_ws();
        self.expect('$')?;
        let braced = self.eat('{');
        let Some(variable) = self.identifier() else {
            return Err(self.error_at(self.pos, "expected loop variable in #foreach"));
        };
        if braced {
            self.expect('}')?;
        }
        self.skip_ws();
        if !self.eat_word("in") {
            return Err(self.error_at(self.pos, "expected 'in' in #foreach"));
        }
        self.skip_ws();
        let iterable = self.expression()?;
        self.skip_ws();
        self.expect(')')?;
        Ok((variable, iterable))
    }

    fn parse_loop_body(
        &mut self,
        start: usize,
    ) -> Result<(Vec<Node>, Option<Vec<Node>>), ParseError> {
        let (body, end, at) = self.parse_nodes()?;
        match end {
            BlockEnd::End => Ok((body, None)),
            BlockEnd::Else => {
                let (otherwise, closing, closed_at) = self.parse_nodes()?;
                match closing {
                    BlockEnd::End => Ok((body, Some(otherwise))),
                    BlockEnd::Eof => Err(self.error_at(start, "#foreach is missing its #end")),
                    BlockEnd::Else | BlockEnd::ElseIf(_) => {
                        Err(self.error_at(closed_at, "unexpected branch after #foreach #else"))
                    }
                }
            }
            BlockEnd::ElseIf(_) => Err(self.error_at(at, "#elseif is not valid inside #foreach")),
            BlockEnd::Eof => Err(self.error_at(start, "#foreach is missing its #end")),
        }
    }

    fn parse_macro_definition(
        &mut self,
        start: usize,
        text: &mut String,
    ) -> Result<MacroDef, ParseError> {
        let (name, params) = self.macro_header()?;
        self.gobble_line(start, text);
        let (body, end, at) = self.parse_nodes()?;
        match end {
            BlockEnd::End => Ok(MacroDef {
                name,
                params,
                body,
                template: self.name.to_owned(),
            }),
            BlockEnd::Eof => Err(self.error_at(start, "#macro is missing its #end")),
            BlockEnd::Else | BlockEnd::ElseIf(_) => {
                Err(self.error_at(at, "unexpected branch inside #macro"))
            }
        }
    }

    fn macro_header(&mut self) -> Result<(String, Vec<String>), ParseError> {
        self.skip_inline_ws();
        self.expect('(')?;
        self.skip_ws();
        let Some(name) = self.identifier() else {
            return Err(self.error_at(self.pos, "expected macro name"));
        };
        let mut params = Vec::new();
        loop {
            self.skip_ws();
            self.eat(',');
            self.skip_ws();
            if self.eat(')') {
                break;
            }
            self.expect('$')?;
            let Some(param) = self.identifier() else {
                return Err(self.error_at(self.pos, "expected macro parameter name"));
            };
            params.push(param);
        }
        Ok((name, params))
    }

    fn parse_macro_call(
        &mut self,
        name: String,
        start: usize,
        with_body: bool,
    ) -> Result<MacroCall, ParseError> {
        self.skip_inline_ws();
        self.expect('(')?;
        let mut args = Vec::new();
        loop {
            self.skip_ws();
            self.eat(',');
            self.skip_ws();
            if self.eat(')') {
                break;
            }
            if self.peek().is_none() {
                return Err(self.error_at(start, format!("unterminated call to #{name}")));
            }
            args.push(self.expression()?);
        }
        let source = self.slice(start, self.pos).to_owned();
        let body = if with_body {
            let (nodes, end, at) = self.parse_nodes()?;
            match end {
                BlockEnd::End => Some(nodes),
                BlockEnd::Eof => {
                    return Err(self.error_at(start, format!("#@{name} is missing its #end")));
                }
                BlockEnd::Else | BlockEnd::ElseIf(_) => {
                    return Err(self.error_at(at, format!("unexpected branch inside #@{name}")));
                }
            }
        } else {
            None
        };
        Ok(MacroCall {
            name,
            args,
            body,
            source,
            pos: self.position_at(start),
        })
    }
}

fn flush(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}

const fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

const fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::engine::DEFAULT_MAX_NESTING_DEPTH;

    fn parse_ok(source: &str) -> Template {
        parse_limited(source, DEFAULT_MAX_NESTING_DEPTH).expect("template parses")
    }

    fn parse_limited(source: &str, max_depth: usize) -> Result<Template, ParseError> {
        parse("test", source, max_depth)
    }

    #[rstest]
    fn plain_text_is_one_node() {
        let template = parse_ok("Hello, world!");
        assert!(matches!(template.nodes.as_slice(), [Node::Text(text)] if text == "Hello, world!"));
    }

    #[rstest]
    #[case("$name", "name", false)]
    #[case("$!name", "name", true)]
    #[case("${name}", "name", false)]
    #[case("$!{name}", "name", true)]
    fn reference_forms(#[case] source: &str, #[case] expected: &str, #[case] quiet: bool) {
        let template = parse_ok(source);
        let [Node::Reference(reference)] = template.nodes.as_slice() else {
            panic!("expected a single reference, got {:?}", template.nodes);
        };
        assert_eq!(reference.name, expected);
        assert_eq!(reference.quiet, quiet);
        assert_eq!(reference.source, source);
    }

    #[rstest]
    fn reference_segments_are_collected() {
        let template = parse_ok("$user.address.city and $items.get(0) and $map['k']");
        let references: Vec<&Reference> = template
            .nodes
            .iter()
            .filter_map(|node| match node {
                Node::Reference(reference) => Some(reference),
                _ => None,
            })
            .collect();
        assert_eq!(references.len(), 3);
        assert!(matches!(
            references[0].segments.as_slice(),
            [Segment::Property(a), Segment::Property(b)] if a == "address" && b == "city"
        ));
        assert!(matches!(
            references[1].segments.as_slice(),
            [Segment::Method { name, args }] if name == "get" && args.len() == 1
        ));
        assert!(matches!(references[2].segments.as_slice(), [Segment::Index(_)]));
    }

    #[rstest]
    #[case("cost: $5")]
    #[case("trailing $")]
    #[case("issue #42")]
    #[case("a # b")]
    fn lone_sigils_stay_text(#[case] source: &str) {
        let template = parse_ok(source);
        let rendered: String = template
            .nodes
            .iter()
            .map(|node| match node {
                Node::Text(text) => text.as_str(),
                other => panic!("unexpected node {other:?}"),
            })
            .collect();
        assert_eq!(rendered, source);
    }

    #[rstest]
    fn comments_are_dropped() {
        let template = parse_ok("a## line comment\nb#* block\ncomment *#c");
        let [Node::Text(text)] = template.nodes.as_slice() else {
            panic!("expected text, got {:?}", template.nodes);
        };
        assert_eq!(text, "abc");
    }

    #[rstest]
    fn unparsed_block_is_verbatim() {
        let template = parse_ok("#[[$not #if(]]#");
        let [Node::Text(text)] = template.nodes.as_slice() else {
            panic!("expected text, got {:?}", template.nodes);
        };
        assert_eq!(text, "$not #if(");
    }

    #[rstest]
    fn escapes_produce_literal_sigils() {
        let template = parse_ok(r"\$name \#if");
        let [Node::Text(text)] = template.nodes.as_slice() else {
            panic!("expected text, got {:?}", template.nodes);
        };
        assert_eq!(text, "$name #if");
    }

    #[rstest]
    fn if_chain_collects_branches() {
        let template = parse_ok("#if($a)A#elseif($b)B#else C#end");
        let [Node::If { branches, otherwise }] = template.nodes.as_slice() else {
            panic!("expected #if, got {:?}", template.nodes);
        };
        assert_eq!(branches.len(), 2);
        assert!(otherwise.is_some());
    }

    #[rstest]
    fn standalone_directive_lines_are_gobbled() {
        let template = parse_ok("start\n  #set($x = 1)\nend");
        let texts: Vec<&str> = template
            .nodes
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, ["start\n", "end"]);
    }

    #[rstest]
    fn macro_definitions_are_hoisted() {
        let template = parse_ok("#macro(greet $who)\nHi $who\n#end\n#greet('Bob')");
        assert_eq!(template.macros.len(), 1);
        let definition = &template.macros[0];
        assert_eq!(definition.name, "greet");
        assert_eq!(definition.params, ["who"]);
        assert!(matches!(
            template.nodes.as_slice(),
            [Node::MacroCall(call)] if call.name == "greet"
        ));
    }

    #[rstest]
    fn string_literals_interpolate_only_when_needed() {
        let template = parse_ok("#set($a = \"plain\")#set($b = \"hi $a\")");
        let values: Vec<&Expr> = template
            .nodes
            .iter()
            .filter_map(|node| match node {
                Node::Set { value, .. } => Some(value),
                _ => None,
            })
            .collect();
        assert!(matches!(values[0], Expr::Literal(_)));
        assert!(matches!(values[1], Expr::Interpolated(_)));
    }

    #[rstest]
    #[case("#if($a)never closed", "#if is missing its #end")]
    #[case("text #end", "unexpected #end without an open block")]
    #[case("#set($a 1)", "expected '='")]
    #[case("${open", "unterminated ${...} reference")]
    #[case("#* open", "unterminated #* comment")]
    fn syntax_errors_are_reported(#[case] source: &str, #[case] fragment: &str) {
        let error =
            parse_limited(source, DEFAULT_MAX_NESTING_DEPTH).expect_err("parse should fail");
        assert!(
            error.message.contains(fragment),
            "message {:?} should contain {fragment:?}",
            error.message
        );
    }

    #[rstest]
    fn error_positions_are_one_based() {
        let error = parse("page", "line one\n  #if($a)", DEFAULT_MAX_NESTING_DEPTH)
            .expect_err("missing #end");
        assert_eq!(error.location, Location::new("page", 2, 3));
    }

    #[rstest]
    #[case::blocks("#if($a)", "#end")]
    #[case::foreach("#foreach($i in $list)", "#end")]
    #[case::macro_bodies("#@wrap()", "#end")]
    fn block_nesting_is_limited(#[case] open: &str, #[case] close: &str) {
        let within = format!("{}x{}", open.repeat(3), close.repeat(3));
        assert!(parse_limited(&within, 4).is_ok());

        let beyond = format!("{}x{}", open.repeat(5), close.repeat(5));
        let error = parse_limited(&beyond, 4).expect_err("too deep");
        assert!(error.message.contains("nesting deeper than 4 levels"));
    }

    #[rstest]
    fn runaway_nesting_fails_without_exhausting_the_stack() {
        let source = format!("#set($x = {}1{})", "(".repeat(100_000), ")".repeat(100_000));
        let error = parse_limited(&source, DEFAULT_MAX_NESTING_DEPTH).expect_err("too deep");
        assert!(error.message.contains("nesting deeper than"));
        assert_eq!(error.location.line, 1);
    }

    #[rstest]
    fn nested_string_interpolation_counts_towards_the_limit() {
        let source = "#if($a)#set($x = \"#if($b)$b#end\")#end";
        assert!(parse_limited(source, 5).is_ok());
        assert!(parse_limited(source, 4).is_err());
    }
}
