// Scripted execution units for driving the runtime without a real CPU

use crate::interface::{self, GuestMemory, MemoryFault};
use crate::unixruntime::cpu::{ExecutableImage, ExecutionUnit, ImageCompiler, RegisterSnapshot, Trap};
use crate::unixruntime::syscall_numbers::EXIT_SYSCALL;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const MEMORY_SIZE: usize = 64 * 1024;

/// One step of a scripted guest program. Only `Sys`, `Pause` and `Fault`
/// leave `run`; everything else executes in place.
#[derive(Debug, Clone)]
pub enum Op {
    /// Trap with a syscall. Its result becomes the current return value.
    Sys(i32, [i32; 6]),
    /// Write bytes into guest memory.
    Store(u32, Vec<u8>),
    /// Branch to the op index when the last syscall returned 0.
    JumpIfRetZero(usize),
    Jump(usize),
    /// Append (label, last return value) to the trace.
    Record(&'static str),
    /// Append (label, big-endian word at addr) to the trace.
    RecordWord(&'static str, u32),
    Pause,
    Fault(u32),
}

pub type Trace = Arc<Mutex<Vec<(&'static str, i32)>>>;

pub fn new_trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

/// Values recorded under `label`, in order.
pub fn recorded(trace: &Trace, label: &str) -> Vec<i32> {
    trace
        .lock()
        .unwrap()
        .iter()
        .filter(|(l, _)| *l == label)
        .map(|(_, v)| *v)
        .collect()
}

pub fn sys(number: i32, args: &[i32]) -> Op {
    let mut words = [0i32; 6];
    words[..args.len()].copy_from_slice(args);
    Op::Sys(number, words)
}

/// A NUL terminated copy of `s` for `Op::Store` or preloaded data.
pub fn cstr(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

pub struct ScriptedCpu {
    memory: Vec<u8>,
    ops: Arc<Vec<Op>>,
    pc: usize,
    ret: i32,
    trace: Trace,
    pub fail_duplicate: bool,
}

impl ScriptedCpu {
    pub fn new(ops: Vec<Op>, trace: Trace) -> ScriptedCpu {
        ScriptedCpu {
            memory: vec![0; MEMORY_SIZE],
            ops: Arc::new(ops),
            pc: 0,
            ret: 0,
            trace,
            fail_duplicate: false,
        }
    }

    /// A unit with no program, used only as guest memory.
    pub fn memory_only() -> ScriptedCpu {
        ScriptedCpu::new(Vec::new(), new_trace())
    }

    pub fn load(&mut self, addr: u32, data: &[u8]) {
        let start = addr as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    pub fn bytes(&self, addr: u32, len: usize) -> &[u8] {
        &self.memory[addr as usize..addr as usize + len]
    }

    pub fn word(&self, addr: u32) -> u32 {
        let b = self.bytes(addr, 4);
        u32::from_be_bytes([b[0], b[1], b[2], b[3]])
    }
}

impl GuestMemory for ScriptedCpu {
    fn read_memory(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryFault> {
        let start = addr as usize;
        match self.memory.get(start..start + buf.len()) {
            Some(src) => {
                buf.copy_from_slice(src);
                Ok(())
            }
            None => Err(MemoryFault { addr }),
        }
    }

    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryFault> {
        let start = addr as usize;
        match self.memory.get_mut(start..start + data.len()) {
            Some(dst) => {
                dst.copy_from_slice(data);
                Ok(())
            }
            None => Err(MemoryFault { addr }),
        }
    }
}

impl ExecutionUnit for ScriptedCpu {
    fn run(&mut self) -> Trap {
        loop {
            let op = match self.ops.get(self.pc) {
                Some(op) => op.clone(),
                // falling off the end of the script exits with 0
                None => return Trap::Syscall { number: EXIT_SYSCALL, args: [0; 6] },
            };
            match op {
                Op::Sys(number, args) => return Trap::Syscall { number, args },
                Op::Store(addr, data) => {
                    self.load(addr, &data);
                    self.pc += 1;
                }
                Op::JumpIfRetZero(target) => {
                    self.pc = if self.ret == 0 { target } else { self.pc + 1 };
                }
                Op::Jump(target) => self.pc = target,
                Op::Record(label) => {
                    self.trace.lock().unwrap().push((label, self.ret));
                    self.pc += 1;
                }
                Op::RecordWord(label, addr) => {
                    let value = self.word(addr) as i32;
                    self.trace.lock().unwrap().push((label, value));
                    self.pc += 1;
                }
                Op::Pause => {
                    self.pc += 1;
                    return Trap::Paused;
                }
                Op::Fault(addr) => return Trap::Fault(MemoryFault { addr }),
            }
        }
    }

    fn complete_syscall(&mut self, result: i32) {
        self.ret = result;
        self.pc += 1;
    }

    fn registers(&self) -> RegisterSnapshot {
        let mut regs = RegisterSnapshot::default();
        regs.pc = self.pc as u32;
        regs.gpr[2] = self.ret as u32;
        regs
    }

    fn set_registers(&mut self, regs: &RegisterSnapshot) {
        self.pc = regs.pc as usize;
        self.ret = regs.gpr[2] as i32;
    }

    fn duplicate(&self) -> Option<Box<dyn ExecutionUnit>> {
        if self.fail_duplicate {
            return None;
        }
        Some(Box::new(ScriptedCpu {
            memory: self.memory.clone(),
            ops: self.ops.clone(),
            pc: self.pc,
            ret: self.ret,
            trace: self.trace.clone(),
            fail_duplicate: false,
        }))
    }
}

/// An image whose instances run `ops` with `data` preloaded, recording the
/// argv of every instantiation.
pub struct MockImage {
    pub ops: Vec<Op>,
    pub data: Vec<(u32, Vec<u8>)>,
    pub trace: Trace,
    pub argv_seen: Mutex<Vec<Vec<String>>>,
}

impl MockImage {
    pub fn new(ops: Vec<Op>, trace: Trace) -> Arc<MockImage> {
        MockImage::with_data(ops, Vec::new(), trace)
    }

    pub fn with_data(ops: Vec<Op>, data: Vec<(u32, Vec<u8>)>, trace: Trace) -> Arc<MockImage> {
        Arc::new(MockImage {
            ops,
            data,
            trace,
            argv_seen: Mutex::new(Vec::new()),
        })
    }

    pub fn argvs(&self) -> Vec<Vec<String>> {
        self.argv_seen.lock().unwrap().clone()
    }
}

impl ExecutableImage for MockImage {
    fn instantiate(&self, argv: &[String], _envp: &[String]) -> Result<Box<dyn ExecutionUnit>, i32> {
        self.argv_seen.lock().unwrap().push(argv.to_vec());
        let mut cpu = ScriptedCpu::new(self.ops.clone(), self.trace.clone());
        for (addr, bytes) in &self.data {
            cpu.load(*addr, bytes);
        }
        Ok(Box::new(cpu))
    }
}

/// Hands out images by the exact bytes of the ELF file and counts calls.
#[derive(Default)]
pub struct MockCompiler {
    images: Mutex<Vec<(Vec<u8>, Arc<MockImage>)>>,
    compiles: AtomicUsize,
}

impl MockCompiler {
    pub fn new() -> Arc<MockCompiler> {
        Arc::new(MockCompiler::default())
    }

    pub fn register(&self, elf: &[u8], image: Arc<MockImage>) {
        self.images.lock().unwrap().push((elf.to_vec(), image));
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl ImageCompiler for MockCompiler {
    fn compile(&self, elf: &[u8]) -> Result<Arc<dyn ExecutableImage>, i32> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let images = self.images.lock().unwrap();
        match images.iter().find(|(bytes, _)| bytes.as_slice() == elf) {
            Some((_, image)) => {
                let image: Arc<dyn ExecutableImage> = image.clone();
                Ok(image)
            }
            None => Err(-(interface::Errno::ENOEXEC as i32)),
        }
    }
}

/// ELF magic followed by `tag`, so distinct programs have distinct bytes.
pub fn elf_bytes(tag: &str) -> Vec<u8> {
    let mut bytes = vec![0x7f, b'E', b'L', b'F'];
    bytes.extend_from_slice(tag.as_bytes());
    bytes
}
