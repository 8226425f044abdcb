use std::collections::HashMap;
use std::fmt::Display;
use std::io::{Read, Write};
use std::mem;

use cranelift::prelude::*;
use cranelift_codegen::ir::{FuncRef, Inst, UserFuncName};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, FuncId, Linkage, Module};
use log::debug;

use crate::errors::{CodeGenError, RuntimeError};
use crate::ir::instruction::{Instruction, Label};
use crate::ir::program::Program;
use crate::runtime::Console;

/// Returned by the compiled function and the runtime routines on success
const STATUS_OK: i32 = 0;

/// Returned if the runtime stored an error in the environment
const STATUS_ERROR: i32 = 1;

/// Settings for the JIT compiler
#[derive(Clone, Debug, Default)]
pub struct JitConfig {
    /// Wait for a key before the compiled function returns
    pub pause_on_exit: bool,

    /// Optimization level passed to cranelift
    ///
    /// Currently this supports none, speed and speed_and_size.<br>
    /// By default speed is used
    pub jit_level: Option<String>,
}

struct RuntimeFuncs {
    alloc: FuncRef,
    read: FuncRef,
    print: FuncRef,
    print_debug: FuncRef,
    pause: FuncRef,
    pointer_fault: FuncRef,
}

struct Builder<'a> {
    pointer_type: Type,
    bcx: FunctionBuilder<'a>,
    env: Value,
    pointer: Variable,
    buffer: Variable,
    size: Variable,
    labels: HashMap<Label, Block>,
    /// Branches into each label block that are not emitted yet
    pending: HashMap<Label, usize>,
    /// Address of the current cell while the pointer is unchanged
    address: Option<Value>,
    fault_block: Block,
    exit_block: Block,
    funcs: RuntimeFuncs,
    pause_on_exit: bool,
}

impl<'a> Builder<'a> {
    pub fn append_instructions(&mut self, instructions: &[Instruction]) {
        for instruction in instructions {
            match *instruction {
                Instruction::PointerInit => self.pointer_init(),
                Instruction::BufferInit(size) => self.buffer_init(size),
                Instruction::PointerAdd(delta) => self.pointer_add(delta),
                Instruction::ValueAdd(delta) => self.value_add(delta),
                Instruction::Print => self.print(),
                Instruction::PrintDebug => self.print_debug(),
                Instruction::Read => self.read(),
                Instruction::JumpIfZero(label) => self.jump_if_zero(label),
                Instruction::JumpIfNotZero(label) => self.jump_if_not_zero(label),
                Instruction::Label(label) => self.label(label),
                Instruction::Halt => self.halt(),
                Instruction::Nop => {
                    // ignore
                }
            }
        }
    }

    fn pointer_init(&mut self) {
        let zero = self.bcx.ins().iconst(types::I64, 0);
        self.bcx.def_var(self.pointer, zero);
        self.address = None;
    }

    fn buffer_init(&mut self, size: u32) {
        let size = self.bcx.ins().iconst(types::I64, size as i64);
        let call = self.bcx.ins().call(self.funcs.alloc, &[self.env, size]);
        let base = self.bcx.inst_results(call)[0];

        self.bcx.def_var(self.buffer, base);
        self.bcx.def_var(self.size, size);
        self.address = None;
    }

    fn pointer_add(&mut self, delta: i64) {
        let pointer = self.bcx.use_var(self.pointer);
        let pointer = self.bcx.ins().iadd_imm(pointer, delta);
        self.bcx.def_var(self.pointer, pointer);
        self.address = None;
    }

    /// Address of the current cell
    ///
    /// Continues in the fault block if the pointer is outside of the buffer.
    /// The checked address is reused until the pointer moves or a label starts a new block.
    fn cell_address(&mut self) -> Value {
        if let Some(address) = self.address {
            return address;
        }

        let pointer = self.bcx.use_var(self.pointer);
        let size = self.bcx.use_var(self.size);

        // Negative pointers are huge when compared unsigned
        let outside = self.bcx.ins().icmp(IntCC::UnsignedGreaterThanOrEqual, pointer, size);

        let inside = self.bcx.create_block();
        self.bcx.ins().brif(outside, self.fault_block, &[pointer], inside, &[]);
        self.enter(inside);

        let base = self.bcx.use_var(self.buffer);
        let mut offset = self.bcx.ins().ishl_imm(pointer, 1);
        if self.pointer_type != types::I64 {
            offset = self.bcx.ins().ireduce(self.pointer_type, offset);
        }

        let address = self.bcx.ins().iadd(base, offset);
        self.address = Some(address);
        address
    }

    /// Switch to a block whose only predecessor is the current one
    fn enter(&mut self, block: Block) {
        self.bcx.switch_to_block(block);
        self.bcx.seal_block(block);
    }

    /// Count an emitted branch into a label block and seal it after the last one
    fn branched_to(&mut self, label: Label) {
        if let Some(pending) = self.pending.get_mut(&label) {
            *pending -= 1;
            if *pending == 0 {
                self.bcx.seal_block(self.labels[&label]);
            }
        }
    }

    fn load(&mut self, address: Value) -> Value {
        self.bcx.ins().load(types::I16, MemFlags::new(), address, 0)
    }

    fn load_extended(&mut self, address: Value) -> Value {
        let value = self.load(address);
        self.bcx.ins().uextend(types::I32, value)
    }

    fn value_add(&mut self, delta: i32) {
        let address = self.cell_address();
        let value = self.load(address);
        let delta = self.bcx.ins().iconst(types::I16, delta as u16 as i64);
        let value = self.bcx.ins().iadd(value, delta);
        self.bcx.ins().store(MemFlags::new(), value, address, 0);
    }

    fn print(&mut self) {
        let address = self.cell_address();
        let value = self.load_extended(address);

        let call = self.bcx.ins().call(self.funcs.print, &[self.env, value]);
        self.check_status(call);
    }

    fn print_debug(&mut self) {
        let address = self.cell_address();
        let value = self.load_extended(address);
        let pointer = self.bcx.use_var(self.pointer);

        let call = self.bcx.ins().call(self.funcs.print_debug, &[self.env, pointer, value]);
        self.check_status(call);
    }

    fn read(&mut self) {
        let address = self.cell_address();

        let call = self.bcx.ins().call(self.funcs.read, &[self.env, address]);
        self.check_status(call);
    }

    /// Leave the function if a runtime routine reported an error
    fn check_status(&mut self, call: Inst) {
        let status = self.bcx.inst_results(call)[0];

        let next = self.bcx.create_block();
        self.bcx.ins().brif(status, self.exit_block, &[status], next, &[]);
        self.enter(next);
    }

    fn jump_if_zero(&mut self, label: Label) {
        let address = self.cell_address();
        let value = self.load(address);
        let target = self.labels[&label];

        let next = self.bcx.create_block();
        self.bcx.ins().brif(value, next, &[], target, &[]);
        self.branched_to(label);
        self.enter(next);
    }

    fn jump_if_not_zero(&mut self, label: Label) {
        let address = self.cell_address();
        let value = self.load(address);
        let target = self.labels[&label];

        let next = self.bcx.create_block();
        self.bcx.ins().brif(value, target, &[], next, &[]);
        self.branched_to(label);
        self.enter(next);
    }

    fn label(&mut self, label: Label) {
        let block = self.labels[&label];

        self.bcx.ins().jump(block, &[]);
        self.branched_to(label);
        self.bcx.switch_to_block(block);
        self.address = None;
    }

    fn halt(&mut self) {
        if self.pause_on_exit {
            let call = self.bcx.ins().call(self.funcs.pause, &[self.env]);
            self.check_status(call);
        }

        let ok = self.bcx.ins().iconst(types::I32, STATUS_OK as i64);
        self.bcx.ins().jump(self.exit_block, &[ok]);

        // Anything behind halt is unreachable
        let next = self.bcx.create_block();
        self.enter(next);
        self.address = None;
    }

    /// Terminate the current block and emit the shared fault and exit blocks
    fn finish(&mut self) {
        let ok = self.bcx.ins().iconst(types::I32, STATUS_OK as i64);
        self.bcx.ins().jump(self.exit_block, &[ok]);

        self.bcx.switch_to_block(self.fault_block);
        self.bcx.seal_block(self.fault_block);
        let pointer = self.bcx.block_params(self.fault_block)[0];
        let call = self.bcx.ins().call(self.funcs.pointer_fault, &[self.env, pointer]);
        let status = self.bcx.inst_results(call)[0];
        self.bcx.ins().jump(self.exit_block, &[status]);

        self.bcx.switch_to_block(self.exit_block);
        self.bcx.seal_block(self.exit_block);
        let status = self.bcx.block_params(self.exit_block)[0];
        self.bcx.ins().return_(&[status]);
    }

    fn unwrap(self) -> FunctionBuilder<'a> {
        self.bcx
    }
}

struct Environment<'a> {
    console: Console<&'a mut dyn Read, &'a mut dyn Write>,
    buffer: Vec<u16>,
    error: Option<RuntimeError>,
}

impl<'a> Environment<'a> {
    fn fail(&mut self, error: RuntimeError) -> i32 {
        self.error = Some(error);
        STATUS_ERROR
    }

    fn status(&mut self, result: Result<(), RuntimeError>) -> i32 {
        match result {
            Ok(()) => STATUS_OK,
            Err(error) => self.fail(error),
        }
    }
}

extern "C" fn bfcc_alloc(env: *mut Environment, size: u64) -> *mut u16 {
    let env = unsafe { &mut *env };
    env.buffer = vec![0; size as usize];
    env.buffer.as_mut_ptr()
}

extern "C" fn bfcc_read(env: *mut Environment, cell: *mut u16) -> i32 {
    let env = unsafe { &mut *env };
    match env.console.read() {
        Ok(value) => {
            unsafe { *cell = value };
            STATUS_OK
        }
        Err(error) => env.fail(error),
    }
}

extern "C" fn bfcc_print(env: *mut Environment, value: u32) -> i32 {
    let env = unsafe { &mut *env };
    let result = env.console.print(value as u16);
    env.status(result)
}

extern "C" fn bfcc_print_debug(env: *mut Environment, pointer: i64, value: u32) -> i32 {
    let env = unsafe { &mut *env };
    let result = env.console.print_debug(pointer, value as u16);
    env.status(result)
}

extern "C" fn bfcc_pause(env: *mut Environment) -> i32 {
    let env = unsafe { &mut *env };
    let result = env.console.pause();
    env.status(result)
}

extern "C" fn bfcc_pointer_fault(env: *mut Environment, pointer: i64) -> i32 {
    let env = unsafe { &mut *env };
    let buffer_size = env.buffer.len();
    env.fail(RuntimeError::PointerOutOfBounds {
        pointer,
        buffer_size,
    })
}

fn internal_error<E: Display>(error: E) -> CodeGenError {
    CodeGenError::InternalCompilerError {
        message: error.to_string(),
    }
}

fn declare_import(module: &mut JITModule, name: &str, params: &[Type], returns: &[Type]) -> Result<FuncId, CodeGenError> {
    let mut sig = module.make_signature();

    for param in params {
        sig.params.push(AbiParam::new(*param));
    }

    for ret in returns {
        sig.returns.push(AbiParam::new(*ret));
    }

    module.declare_function(name, Linkage::Import, &sig).map_err(internal_error)
}

/// A compiled program that can be executed
pub struct CompiledJitModule {
    module: Option<JITModule>,
    main_func: FuncId,
    clir: String,
}

impl CompiledJitModule {
    /// Compile program
    pub fn new(program: &Program, config: &JitConfig) -> Result<CompiledJitModule, CodeGenError> {
        program.verify()?;

        let mut flag_builder = settings::builder();
        flag_builder.set("use_colocated_libcalls", "false").map_err(internal_error)?;
        flag_builder.set("is_pic", "false").map_err(internal_error)?;
        flag_builder
            .set("opt_level", config.jit_level.as_deref().unwrap_or("speed"))
            .map_err(internal_error)?;

        let isa_builder = cranelift_native::builder().map_err(|msg| CodeGenError::InternalCompilerError {
            message: format!("host machine is not supported: {}", msg),
        })?;

        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(internal_error)?;

        let mut jit_builder = JITBuilder::with_isa(isa, default_libcall_names());
        jit_builder.symbol("bfcc_alloc", bfcc_alloc as *const u8);
        jit_builder.symbol("bfcc_read", bfcc_read as *const u8);
        jit_builder.symbol("bfcc_print", bfcc_print as *const u8);
        jit_builder.symbol("bfcc_print_debug", bfcc_print_debug as *const u8);
        jit_builder.symbol("bfcc_pause", bfcc_pause as *const u8);
        jit_builder.symbol("bfcc_pointer_fault", bfcc_pointer_fault as *const u8);

        let mut module = JITModule::new(jit_builder);
        let pointer_type = module.target_config().pointer_type();

        let alloc = declare_import(&mut module, "bfcc_alloc", &[pointer_type, types::I64], &[pointer_type])?;
        let read = declare_import(&mut module, "bfcc_read", &[pointer_type, pointer_type], &[types::I32])?;
        let print = declare_import(&mut module, "bfcc_print", &[pointer_type, types::I32], &[types::I32])?;
        let print_debug = declare_import(
            &mut module,
            "bfcc_print_debug",
            &[pointer_type, types::I64, types::I32],
            &[types::I32],
        )?;
        let pause = declare_import(&mut module, "bfcc_pause", &[pointer_type], &[types::I32])?;
        let pointer_fault = declare_import(&mut module, "bfcc_pointer_fault", &[pointer_type, types::I64], &[types::I32])?;

        let mut ctx = module.make_context();
        let mut func_ctx = FunctionBuilderContext::new();

        let mut sig = module.make_signature();
        sig.params.push(AbiParam::new(pointer_type));
        sig.returns.push(AbiParam::new(types::I32));

        let func = module
            .declare_function("main", Linkage::Local, &sig)
            .map_err(internal_error)?;

        ctx.func.signature = sig;
        ctx.func.name = UserFuncName::user(0, func.as_u32());

        {
            let mut bcx: FunctionBuilder = FunctionBuilder::new(&mut ctx.func, &mut func_ctx);

            let block = bcx.create_block();

            bcx.switch_to_block(block);
            bcx.append_block_params_for_function_params(block);
            bcx.seal_block(block);

            let env = bcx.block_params(block)[0];

            let pointer = Variable::from_u32(0);
            let buffer = Variable::from_u32(1);
            let size = Variable::from_u32(2);

            bcx.declare_var(pointer, types::I64);
            bcx.declare_var(buffer, pointer_type);
            bcx.declare_var(size, types::I64);

            // Every access faults until the buffer is allocated
            let zero = bcx.ins().iconst(types::I64, 0);
            bcx.def_var(pointer, zero);
            bcx.def_var(size, zero);
            let null = bcx.ins().iconst(pointer_type, 0);
            bcx.def_var(buffer, null);

            // Label blocks are entered by the jump at the label itself and by every branch to it
            let mut labels = HashMap::new();
            let mut pending: HashMap<Label, usize> = HashMap::new();
            for instruction in &program.instructions {
                match *instruction {
                    Instruction::Label(label) => {
                        labels.insert(label, bcx.create_block());
                        *pending.entry(label).or_default() += 1;
                    }
                    Instruction::JumpIfZero(label) | Instruction::JumpIfNotZero(label) => {
                        *pending.entry(label).or_default() += 1;
                    }
                    _ => {}
                }
            }

            let fault_block = bcx.create_block();
            bcx.append_block_param(fault_block, types::I64);

            let exit_block = bcx.create_block();
            bcx.append_block_param(exit_block, types::I32);

            let funcs = RuntimeFuncs {
                alloc: module.declare_func_in_func(alloc, &mut bcx.func),
                read: module.declare_func_in_func(read, &mut bcx.func),
                print: module.declare_func_in_func(print, &mut bcx.func),
                print_debug: module.declare_func_in_func(print_debug, &mut bcx.func),
                pause: module.declare_func_in_func(pause, &mut bcx.func),
                pointer_fault: module.declare_func_in_func(pointer_fault, &mut bcx.func),
            };

            let mut builder = Builder {
                pointer_type,
                bcx,
                env,
                pointer,
                buffer,
                size,
                labels,
                pending,
                address: None,
                fault_block,
                exit_block,
                funcs,
                pause_on_exit: config.pause_on_exit,
            };

            builder.append_instructions(&program.instructions);
            builder.finish();

            bcx = builder.unwrap();
            bcx.finalize();
        }

        let clir = format!("{}", ctx.func);

        module.define_function(func, &mut ctx).map_err(internal_error)?;
        module.clear_context(&mut ctx);

        module.finalize_definitions().map_err(internal_error)?;

        debug!("Compiled {} instructions with cranelift", program.len());

        Ok(CompiledJitModule {
            module: Some(module),
            main_func: func,
            clir,
        })
    }

    /// Execute program
    ///
    /// After execution the cell buffer is returned
    pub fn execute<R: Read, W: Write>(&self, mut input: R, mut output: W) -> Result<Vec<u16>, RuntimeError> {
        let module = match self.module.as_ref() {
            Some(module) => module,
            None => return Ok(vec![]),
        };

        let code = module.get_finalized_function(self.main_func);

        let exec = unsafe { mem::transmute::<*const u8, extern "C" fn(*mut Environment) -> i32>(code) };

        let input: &mut dyn Read = &mut input;
        let output: &mut dyn Write = &mut output;

        let mut env = Box::new(Environment {
            console: Console::new(input, output),
            buffer: vec![],
            error: None,
        });

        let status = exec(&mut *env);

        if let Some(error) = env.error.take() {
            return Err(error);
        }

        debug_assert_eq!(status, STATUS_OK);

        env.console.flush()?;

        Ok(mem::take(&mut env.buffer))
    }

    /// Get the cranelift intermediate representation used for the compiled program
    pub fn get_clir(&self) -> String {
        self.clir.clone()
    }
}

impl Drop for CompiledJitModule {
    fn drop(&mut self) {
        unsafe {
            if let Some(module) = self.module.take() {
                module.free_memory();
            }
        }
    }
}
