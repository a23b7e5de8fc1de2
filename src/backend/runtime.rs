//! Rust implementation of the I/O hooks for programs run in process.
//!
//! Output goes to stdout and input comes from stdin, unless the running
//! thread is inside [`capture`].

use std::cell::RefCell;
use std::ffi::{c_char, CStr};
use std::io::{self, BufRead, Write};

use crate::frontend::Hook;

enum Source {
    Stdin,
    Fixed,
}

/// Buffered program input, refilled line by line from stdin
struct Input {
    buf: Vec<u8>,
    pos: usize,
    source: Source,
}

impl Input {
    fn stdin() -> Input {
        Input {
            buf: Vec::new(),
            pos: 0,
            source: Source::Stdin,
        }
    }

    fn fixed(text: &str) -> Input {
        Input {
            buf: text.as_bytes().to_vec(),
            pos: 0,
            source: Source::Fixed,
        }
    }

    fn refill(&mut self) -> bool {
        match self.source {
            Source::Fixed => false,
            Source::Stdin => {
                let mut line = Vec::new();
                match io::stdin().lock().read_until(b'\n', &mut line) {
                    Ok(n) if n > 0 => {
                        self.buf = line;
                        self.pos = 0;
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    fn peek(&mut self) -> Option<u8> {
        if self.pos >= self.buf.len() && !self.refill() {
            return None;
        }
        Some(self.buf[self.pos])
    }

    fn next_byte(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, mut accept: impl FnMut(u8, &[u8]) -> bool) -> String {
        let mut token = Vec::new();
        while let Some(b) = self.peek() {
            if !accept(b, &token) {
                break;
            }
            token.push(b);
            self.pos += 1;
        }
        String::from_utf8_lossy(&token).into_owned()
    }

    /// Like `scanf("%d")`: 0 if no number follows
    fn read_i32(&mut self) -> i32 {
        self.skip_whitespace();
        let token = self.take_while(|b, token| b.is_ascii_digit() || (token.is_empty() && (b == b'-' || b == b'+')));
        token.parse::<i64>().map_or(0, |n| n as i32)
    }

    /// Like `scanf("%lf")`: 0.0 if no number follows
    fn read_f64(&mut self) -> f64 {
        self.skip_whitespace();
        let token = self.take_while(|b, _| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'));
        token.parse().unwrap_or(0.0)
    }

    /// Like `scanf(" %c")`: the next non-blank byte, 0 at end of input
    fn read_char(&mut self) -> i32 {
        self.skip_whitespace();
        self.next_byte().map_or(0, i32::from)
    }
}

thread_local! {
    static INPUT: RefCell<Input> = RefCell::new(Input::stdin());
    static OUTPUT: RefCell<Option<Vec<u8>>> = const { RefCell::new(None) };
}

/// Runs `f` with `input` as program input and returns what the program wrote
pub fn capture<R>(input: &str, f: impl FnOnce() -> R) -> (R, String) {
    let saved = INPUT.with(|cell| cell.replace(Input::fixed(input)));
    OUTPUT.with(|cell| *cell.borrow_mut() = Some(Vec::new()));
    let result = f();
    let output = OUTPUT.with(|cell| cell.borrow_mut().take()).unwrap_or_default();
    INPUT.with(|cell| cell.replace(saved));
    (result, String::from_utf8_lossy(&output).into_owned())
}

fn emit(bytes: &[u8]) {
    OUTPUT.with(|cell| match cell.borrow_mut().as_mut() {
        Some(buffer) => {
            buffer.extend_from_slice(bytes);
            buffer.push(b'\n');
        }
        None => {
            let mut stdout = io::stdout().lock();
            // a closed stdout is not the program's concern
            let _ = stdout.write_all(bytes).and_then(|_| stdout.write_all(b"\n"));
        }
    });
}

/// `printf("%f")` formatting
fn format_double(value: f64) -> String {
    let sign = if value.is_sign_negative() { "-" } else { "" };
    if value.is_nan() {
        format!("{}nan", sign)
    } else if value.is_infinite() {
        format!("{}inf", sign)
    } else {
        format!("{:.6}", value)
    }
}

extern "C" fn cinder_write_i32(value: i32) {
    emit(value.to_string().as_bytes());
}

extern "C" fn cinder_write_f64(value: f64) {
    emit(format_double(value).as_bytes());
}

extern "C" fn cinder_write_char(value: i32) {
    emit(&[value as u8]);
}

extern "C" fn cinder_write_bool(value: i32) {
    let text: &[u8] = if value != 0 { b"true" } else { b"false" };
    emit(text);
}

extern "C" fn cinder_write_str(ptr: *const c_char) {
    if ptr.is_null() {
        emit(b"(null)");
        return;
    }
    // SAFETY: generated code passes pointers to NUL terminated strings
    let text = unsafe { CStr::from_ptr(ptr) };
    emit(text.to_bytes());
}

extern "C" fn cinder_read_i32() -> i32 {
    INPUT.with(|cell| cell.borrow_mut().read_i32())
}

extern "C" fn cinder_read_f64() -> f64 {
    INPUT.with(|cell| cell.borrow_mut().read_f64())
}

extern "C" fn cinder_read_char() -> i32 {
    INPUT.with(|cell| cell.borrow_mut().read_char())
}

/// Address the JIT binds the hook's symbol to
pub(crate) fn address(hook: Hook) -> *const u8 {
    match hook {
        Hook::WriteI32 => cinder_write_i32 as *const u8,
        Hook::WriteF64 => cinder_write_f64 as *const u8,
        Hook::WriteChar => cinder_write_char as *const u8,
        Hook::WriteBool => cinder_write_bool as *const u8,
        Hook::WriteStr => cinder_write_str as *const u8,
        Hook::ReadI32 => cinder_read_i32 as *const u8,
        Hook::ReadF64 => cinder_read_f64 as *const u8,
        Hook::ReadChar => cinder_read_char as *const u8,
    }
}
