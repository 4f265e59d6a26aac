//! Standard-library natives.
//!
//! These are external collaborators of the core: each one is an ordinary
//! function registered under a global name. They talk to the VM only
//! through the heap handed to them and their `Result`.

use std::fs;
use std::io::{self, BufRead, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use loam_core::{Heap, NativeError, Obj, Value};
use loam_vm::Vm;

/// Registers the whole standard library on a VM.
pub fn register(vm: &mut Vm) {
    vm.register_native("clock", clock_native, 0, 0);
    vm.register_native("get_line", get_line_native, 0, 1);
    vm.register_native("read_file", read_file_native, 1, 1);
}

/// `clock()` - seconds since the Unix epoch, as a Number.
fn clock_native(_heap: &mut Heap, _args: &[Value]) -> Result<Value, NativeError> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| NativeError::msg(format!("clock unavailable: {err}")))?;
    Ok(Value::Number(elapsed.as_secs_f64()))
}

/// `get_line([prompt])` - prints the optional prompt, then reads one
/// line from stdin. End of input is an error.
fn get_line_native(heap: &mut Heap, args: &[Value]) -> Result<Value, NativeError> {
    if let Some(&prompt) = args.first() {
        print!("{}", heap.format_value(prompt));
        io::stdout()
            .flush()
            .map_err(|err| NativeError::msg(format!("could not flush prompt: {err}")))?;
    }

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|err| NativeError::msg(format!("could not read line: {err}")))?;
    if read == 0 {
        return Err(NativeError::msg("input cancelled (EOF)"));
    }

    let line = line.trim_end_matches(['\n', '\r']);
    Ok(Value::Obj(Obj::String(heap.copy_string(line))))
}

/// `read_file(path)` - the whole file as a String.
fn read_file_native(heap: &mut Heap, args: &[Value]) -> Result<Value, NativeError> {
    let Some(path_id) = args[0].as_string() else {
        return Err(NativeError::msg("read_file expects a string path."));
    };

    let path = heap.string(path_id).chars.to_string();
    let contents = fs::read_to_string(&path)
        .map_err(|err| NativeError::msg(format!("could not read file \"{path}\": {err}")))?;
    Ok(Value::Obj(Obj::String(heap.take_string(contents))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_returns_positive_number() {
        let mut heap = Heap::new();
        let value = clock_native(&mut heap, &[]).unwrap();
        match value {
            Value::Number(n) => assert!(n > 0.0),
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn test_read_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "print 1;").unwrap();

        let mut heap = Heap::new();
        let path = heap.copy_string(file.path().to_str().unwrap());
        let result = read_file_native(&mut heap, &[Value::Obj(Obj::String(path))]).unwrap();
        let id = result.as_string().unwrap();
        assert_eq!(&*heap.string(id).chars, "print 1;");
    }

    #[test]
    fn test_read_file_missing() {
        let mut heap = Heap::new();
        let path = heap.copy_string("no/such/file.loam");
        let err = read_file_native(&mut heap, &[Value::Obj(Obj::String(path))]).unwrap_err();
        assert!(err.0.contains("could not read file"));
    }

    #[test]
    fn test_read_file_wrong_type() {
        let mut heap = Heap::new();
        let err = read_file_native(&mut heap, &[Value::Number(1.0)]).unwrap_err();
        assert_eq!(err.0, "read_file expects a string path.");
    }
}
