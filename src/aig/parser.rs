use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

use crate::{Aig, AigEdge, Result, aig::error::ParserError, certificate::StableId};

fn read_u64(s: &str) -> std::result::Result<u64, ParserError> {
    s.parse::<u64>()
        .map_err(|_| ParserError::InvalidToken(s.to_string() + " expected u64"))
}

fn check_even(x: u64) -> Result<()> {
    if x & 1 == 1 {
        return Err(ParserError::InvalidToken(
            "expected literal to be even, got ".to_string() + &x.to_string(),
        )
        .into());
    }
    Ok(())
}

/// Reads one line into `line` (cleared first), erroring on end of file.
fn read_line(reader: &mut impl BufRead, line: &mut String) -> Result<()> {
    line.clear();
    let n = reader
        .read_line(line)
        .map_err(|e| ParserError::IoError(e.to_string()))?;
    if n == 0 {
        return Err(ParserError::InvalidToken("unexpected end of file".to_string()).into());
    }
    Ok(())
}

fn single_token<'a>(line: &'a str, what: &str) -> Result<&'a str> {
    let tokens = line.split_whitespace().collect::<Vec<&str>>();
    match tokens.len() {
        0 => Err(ParserError::InvalidToken(format!("expected {} token, got nothing", what)).into()),
        1 => Ok(tokens[0]),
        _ => Err(ParserError::InvalidToken(format!(
            "expected nothing after {}, got {}",
            what, tokens[1]
        ))
        .into()),
    }
}

/// Variables are used as stable ids: they must stay below [`StableId::CONST1`].
const MAX_VAR: u64 = StableId::CONST1.get() as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    binary: bool,
    m: u64,
    i: u64,
    l: u64,
    o: u64,
    a: u64,
}

impl TryFrom<&String> for Header {
    type Error = ParserError;

    fn try_from(line: &String) -> std::result::Result<Self, Self::Error> {
        let tokens = line.split_whitespace().collect::<Vec<&str>>();

        if tokens.len() < 6 {
            return Err(ParserError::InvalidToken(
                "missing header tokens".to_string(),
            ));
        }

        let binary = match tokens[0] {
            "aag" => false,
            "aig" => true,
            _ => {
                return Err(ParserError::InvalidToken(
                    "expected aag or aig".to_string(),
                ));
            }
        };

        let m = read_u64(tokens[1])?;
        let i = read_u64(tokens[2])?;
        let l = read_u64(tokens[3])?;
        let o = read_u64(tokens[4])?;
        let a = read_u64(tokens[5])?;

        if tokens.len() > 6 {
            return Err(ParserError::UnsupportedFeature(
                "header only supports M I L O A".to_string(),
            ));
        }
        if l > 0 {
            return Err(ParserError::UnsupportedFeature(
                "latches (only combinational AIGs are supported)".to_string(),
            ));
        }
        let ia = i
            .checked_add(a)
            .ok_or_else(|| ParserError::InvalidToken("I+A does not fit on 64 bits".to_string()))?;
        if ia > m {
            return Err(ParserError::InvalidToken(format!(
                "M={} is smaller than I+A={}",
                m, ia
            )));
        }
        if m >= MAX_VAR {
            return Err(ParserError::InvalidToken(format!(
                "M={} is too large, variables must be below {}",
                m, MAX_VAR
            )));
        }

        Ok(Header {
            binary,
            m,
            i,
            l,
            o,
            a,
        })
    }
}

/// Maps AIGER variables to signals of the AIG under construction.
///
/// Every node created while parsing carries the AIGER variable as stable id, so that
/// certificates can be related to the AIGER file.
struct Builder {
    aig: Aig,
    max_var: u64,
    vars: HashMap<u64, AigEdge>,
}

impl Builder {
    fn new(header: &Header) -> Self {
        Builder {
            aig: Aig::new(),
            max_var: header.m,
            vars: HashMap::from([(0, AigEdge::new(0, false))]),
        }
    }

    fn check_var(&self, var: u64) -> Result<()> {
        if var >= MAX_VAR {
            return Err(ParserError::InvalidToken(format!(
                "variable {} cannot be used as a stable id",
                var
            ))
            .into());
        }
        if var > self.max_var {
            return Err(ParserError::InvalidToken(format!(
                "variable {} is larger than M={}",
                var, self.max_var
            ))
            .into());
        }
        Ok(())
    }

    fn add_input(&mut self, lit: u64) -> Result<()> {
        check_even(lit)?;
        let var = lit >> 1;
        self.check_var(var)?;
        if var == 0 || self.vars.contains_key(&var) {
            return Err(ParserError::InvalidToken(format!("variable {} defined twice", var)).into());
        }
        let edge = self.aig.add_input_with_certif(StableId::new(var as u32));
        self.vars.insert(var, edge);
        Ok(())
    }

    fn literal(&self, lit: u64) -> Option<AigEdge> {
        self.vars
            .get(&(lit >> 1))
            .map(|edge| edge.not_cond(lit & 1 != 0))
    }

    /// Defines `lhs = rhs0 & rhs1`. Returns false if a fanin is not defined yet.
    fn add_and(&mut self, lhs: u64, rhs0: u64, rhs1: u64) -> Result<bool> {
        let var = lhs >> 1;
        let (Some(fanin0), Some(fanin1)) = (self.literal(rhs0), self.literal(rhs1)) else {
            return Ok(false);
        };
        let edge = match self.aig.lookup_and(fanin0, fanin1) {
            // Redundant gate in the file, simply aliased
            Some(edge) => edge,
            None => AigEdge::new(
                self.aig
                    .create_and(fanin0, fanin1, StableId::new(var as u32))?,
                false,
            ),
        };
        self.vars.insert(var, edge);
        Ok(true)
    }

    fn check_and_lhs(&self, lhs: u64) -> Result<()> {
        check_even(lhs)?;
        let var = lhs >> 1;
        self.check_var(var)?;
        if var == 0 || self.vars.contains_key(&var) {
            return Err(ParserError::InvalidToken(format!("variable {} defined twice", var)).into());
        }
        Ok(())
    }

    fn finish(mut self, outputs: Vec<u64>) -> Result<Aig> {
        for lit in outputs {
            self.check_var(lit >> 1)?;
            let edge = self.literal(lit).ok_or(ParserError::InvalidToken(format!(
                "output literal {} is not defined",
                lit
            )))?;
            self.aig.add_output(edge)?;
        }
        // Let's clean the useless stuff
        self.aig.cleanup()?;
        // Is the AIG okay?
        self.aig.check_integrity()?;
        Ok(self.aig)
    }
}

fn read_outputs(o: u64, reader: &mut impl BufRead) -> Result<Vec<u64>> {
    let mut outputs = Vec::new();
    let mut line = String::new();
    for _ in 0..o {
        read_line(reader, &mut line)?;
        outputs.push(read_u64(single_token(&line, "output")?)?);
    }
    Ok(outputs)
}

/// Parser for the ASCII AIGER format.
mod ascii {
    use std::collections::HashSet;

    use super::*;

    fn read_and(line: &str) -> Result<(u64, u64, u64)> {
        let tokens = line.split_whitespace().collect::<Vec<&str>>();

        if tokens.len() < 3 {
            return Err(ParserError::InvalidToken("not enough and tokens".to_string()).into());
        }

        if tokens.len() > 3 {
            return Err(ParserError::InvalidToken(
                "expected nothing after and tokens, got ".to_string() + tokens[3],
            )
            .into());
        }

        let lhs = read_u64(tokens[0])?;
        check_even(lhs)?;
        Ok((lhs, read_u64(tokens[1])?, read_u64(tokens[2])?))
    }

    pub(super) fn parse(header: Header, reader: &mut impl BufRead) -> Result<Aig> {
        let mut builder = Builder::new(&header);
        let mut line = String::new();

        for _ in 0..header.i {
            read_line(reader, &mut line)?;
            builder.add_input(read_u64(single_token(&line, "input")?)?)?;
        }
        let outputs = read_outputs(header.o, reader)?;

        let mut pending = Vec::new();
        let mut defined = HashSet::new();
        for _ in 0..header.a {
            read_line(reader, &mut line)?;
            let (lhs, rhs0, rhs1) = read_and(&line)?;
            builder.check_and_lhs(lhs)?;
            if !defined.insert(lhs) {
                return Err(ParserError::InvalidToken(format!("variable {} defined twice", lhs >> 1)).into());
            }
            pending.push((lhs, rhs0, rhs1));
        }

        // Gates may be listed in any order: define whatever is ready until nothing is left.
        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();
            for (lhs, rhs0, rhs1) in pending {
                if !builder.add_and(lhs, rhs0, rhs1)? {
                    waiting.push((lhs, rhs0, rhs1));
                }
            }
            if waiting.len() == before {
                return Err(ParserError::InvalidToken(format!(
                    "and gate {} depends on an undefined literal or on a cycle",
                    waiting[0].0
                ))
                .into());
            }
            pending = waiting;
        }

        builder.finish(outputs)
    }

}

/// Parser for the bin AIGER format.
mod bin {
    use super::*;

    fn next_byte(buf: &[u8], offset: &mut usize) -> Result<u8> {
        if *offset >= buf.len() {
            return Err(ParserError::InvalidToken("unexpected end of file".to_string()).into());
        }

        let byte = buf[*offset];
        *offset += 1;
        Ok(byte)
    }

    pub(super) fn decode_delta(buf: &[u8], offset: &mut usize) -> Result<u64> {
        let mut x = 0;
        let mut i = 0;

        loop {
            let ch = next_byte(buf, offset)?;
            if i >= 10 {
                return Err(ParserError::InvalidToken("delta does not fit on 64 bits".to_string()).into());
            }
            x |= ((ch & 0x7f) as u64) << (7 * i);
            i += 1;

            if ch & 0x80 == 0 {
                break;
            }
        }
        Ok(x)
    }

    pub(super) fn parse(header: Header, reader: &mut impl BufRead) -> Result<Aig> {
        let mut builder = Builder::new(&header);

        // Inputs are implicit in the binary format.
        for var in 1..1 + header.i {
            builder.add_input(var << 1)?;
        }
        let outputs = read_outputs(header.o, reader)?;

        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| ParserError::IoError(e.to_string()))?;

        let mut offset = 0;
        let mut lhs = header
            .i
            .checked_add(header.l)
            .and_then(|v| v.checked_add(1))
            .and_then(|v| v.checked_mul(2))
            .ok_or_else(|| ParserError::InvalidToken("I+L does not fit on 64 bits".to_string()))?;
        for _ in 0..header.a {
            let delta0 = decode_delta(&buf, &mut offset)?;
            let delta1 = decode_delta(&buf, &mut offset)?;

            let rhs0 = lhs.checked_sub(delta0);
            let rhs1 = rhs0.and_then(|rhs0| rhs0.checked_sub(delta1));
            let (Some(rhs0), Some(rhs1)) = (rhs0, rhs1) else {
                return Err(ParserError::InvalidToken(format!("invalid delta for and gate {}", lhs)).into());
            };
            if rhs0 >= lhs {
                return Err(ParserError::InvalidToken(format!("invalid delta for and gate {}", lhs)).into());
            }

            builder.check_and_lhs(lhs)?;
            builder.add_and(lhs, rhs0, rhs1)?;
            lhs += 2;
        }

        builder.finish(outputs)
    }
}

impl Aig {
    /// Creates an AIG from an open AIGER reader, in either the ASCII (`aag`) or the binary (`aig`)
    /// format, as announced by the header.
    ///
    /// Only combinational AIGs are supported: latches, symbols and comments are refused or ignored.
    /// Each node carries its AIGER variable as stable id.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        // Reading the header
        read_line(&mut reader, &mut line)?;
        let header: Header = Header::try_from(&line)?;

        if header.binary {
            bin::parse(header, &mut reader)
        } else {
            ascii::parse(header, &mut reader)
        }
    }

    /// Creates an AIG from an .aig (resp .aag) file using bin (resp. ASCII) AIGER format.
    ///
    /// Warning, this uses a homemade "parser" which definitely does not support all AIG features
    /// (only the bare minimum).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("aag") | Some("aig") => {}
            _ => {
                return Err(ParserError::IoError(
                    "invalid extension, expected .aag or .aig".to_string(),
                )
                .into());
            }
        }
        let f = File::open(path.as_ref()).map_err(|z| ParserError::IoError(z.to_string()))?;
        Aig::from_reader(f)
    }
}
