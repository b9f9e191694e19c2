use kt8::{
    assemble, Cpu, CpuConfig, Fault, Flag, Memory, Ram, RegisterName, RunState, Stack,
    StackFaultKind,
};
use proptest::prelude::*;

const BASE: u16 = 0x4000;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Assemble `source`, load it at the start of program memory and run it.
fn run(source: &str) -> (Cpu<String>, Ram) {
    init_logging();
    let image = assemble(source).unwrap();
    let mut ram = Ram::default();
    ram.load(&image, BASE as usize).unwrap();
    let mut cpu = Cpu::new(CpuConfig::default(), String::new()).unwrap();
    cpu.run(&mut ram).unwrap();
    assert_eq!(cpu.state(), RunState::Halted);
    (cpu, ram)
}

fn register(cpu: &Cpu<String>, name: RegisterName) -> u8 {
    cpu.registers().get(name)
}

#[test]
fn add_through_indexed_store() {
    let (cpu, mut ram) = run("LDA #5\nSTA 0,w\nADD #3\nSTA 0,w");
    assert_eq!(cpu.get_a(), 8);
    assert!(!cpu.is_flag_set(Flag::Zero));
    assert!(!cpu.is_flag_set(Flag::Negative));
    assert!(!cpu.is_flag_set(Flag::Carry));
    assert_eq!(ram.read_byte(0), Ok(8));
}

#[test]
fn two_byte_stack() {
    let mut ram = Ram::new(16);
    let mut stack = Stack::new(4, 2);
    stack.push(&mut ram, 10).unwrap();
    stack.push(&mut ram, 20).unwrap();
    assert!(matches!(
        stack.push(&mut ram, 30),
        Err(Fault::StackFault {
            kind: StackFaultKind::Overflow,
            ..
        })
    ));
    assert_eq!(stack.peek(&mut ram, 4), Ok(20));
    assert_eq!(stack.peek(&mut ram, 5), Ok(10));
}

#[test]
fn compare_outcomes() {
    for (operand, carry, zero, negative) in [
        (3, true, false, false),
        (5, true, true, false),
        (7, false, false, true),
    ] {
        let (cpu, _) = run(&format!("LDA #5\nCMP #{operand}"));
        assert_eq!(cpu.is_flag_set(Flag::Carry), carry, "CMP #{operand}");
        assert_eq!(cpu.is_flag_set(Flag::Zero), zero, "CMP #{operand}");
        assert_eq!(cpu.is_flag_set(Flag::Negative), negative, "CMP #{operand}");
        assert_eq!(cpu.get_a(), 5);
    }
}

#[test]
fn bad_header_changes_nothing() {
    init_logging();
    let mut ram = Ram::default();
    ram.load(&[0x00, 0x00, 0x03, 4, 9, 0], BASE as usize).unwrap();
    let before = ram.clone();
    let mut cpu = Cpu::new(CpuConfig::default(), String::new()).unwrap();
    let registers = cpu.registers().clone();
    assert_eq!(cpu.run(&mut ram), Err(Fault::InvalidHeader([0x00, 0x00, 0x03])));
    assert_eq!(cpu.registers(), &registers);
    assert!(ram == before);
    assert_eq!(cpu.state(), RunState::Faulted);
}

#[test]
fn start_outside_program_memory() {
    init_logging();
    let mut ram = Ram::default();
    let mut cpu = Cpu::new(CpuConfig::default(), String::new()).unwrap();
    assert_eq!(
        cpu.execute(&mut ram, 0x8000, |_| false),
        Err(Fault::SegmentFault(0x8000))
    );
}

#[test]
fn jump_resumes_after_the_target() {
    let (cpu, _) = run(
        "JMP $4009 ; $4003
         LDX #1    ; $4006
         LDY #2    ; $4009, skipped
         LDZ #3    ; $400C",
    );
    assert_eq!(register(&cpu, RegisterName::X), 0);
    assert_eq!(register(&cpu, RegisterName::Y), 0);
    assert_eq!(register(&cpu, RegisterName::Z), 3);
}

#[test]
fn indirect_jump_reads_a_big_endian_word() {
    let (cpu, _) = run(
        "LDA #$40
         STA $0200
         LDA #$12
         STA $0201
         JMP ($0200) ; $400F
         LDX #1      ; $4012, skipped
         LDY #1      ; $4015",
    );
    assert_eq!(register(&cpu, RegisterName::X), 0);
    assert_eq!(register(&cpu, RegisterName::Y), 1);
}

#[test]
fn return_resumes_after_the_call() {
    let (cpu, _) = run(
        "JFN $400C ; $4003
         LDX #1    ; $4006
         JMP $4012 ; $4009, jumps past the end
         LDY #9    ; $400C, skipped
         LDA #7    ; $400F
         RET       ; $4012",
    );
    assert_eq!(cpu.get_a(), 7);
    assert_eq!(register(&cpu, RegisterName::X), 1);
    assert_eq!(register(&cpu, RegisterName::Y), 0);
    assert_eq!(cpu.stack().depth(), 0);
}

#[test]
fn branches_are_measured_from_the_branch() {
    let (cpu, _) = run(
        "LDA #0    ; $4003
         BEQ 6     ; $4006
         LDX #1    ; $4009, skipped
         LDY #1    ; $400C",
    );
    assert_eq!(register(&cpu, RegisterName::X), 0);
    assert_eq!(register(&cpu, RegisterName::Y), 1);
}

#[test]
fn backward_branch_loops() {
    let (_, mut ram) = run(
        "LDX #3     ; $4003
         INC $0010  ; $4006
         DEX        ; $4009
         BNE -6     ; $400C",
    );
    assert_eq!(ram.read_byte(0x0010), Ok(3));
}

#[test]
fn untaken_branch_falls_through() {
    let (cpu, _) = run("LDA #1\nBEQ 6\nLDX #1\nLDY #1");
    assert_eq!(register(&cpu, RegisterName::X), 1);
    assert_eq!(register(&cpu, RegisterName::Y), 1);
}

#[test]
fn every_branch_follows_its_flag() {
    for (setup, branch, taken) in [
        ("SEC", "BCS", true),
        ("CLC", "BCS", false),
        ("CLC", "BCC", true),
        ("SEC", "BCC", false),
        ("LDA #0", "BEQ", true),
        ("LDA #1", "BEQ", false),
        ("LDA #1", "BNE", true),
        ("LDA #0", "BNE", false),
        ("LDA #$80", "BRN", true),
        ("LDA #1", "BRN", false),
        ("LDA #1", "BRP", true),
        ("LDA #$80", "BRP", false),
    ] {
        let (cpu, _) = run(&format!("{setup}\n{branch} 6\nLDX #1\nLDY #1"));
        let skipped = if taken { 0 } else { 1 };
        assert_eq!(register(&cpu, RegisterName::X), skipped, "{setup}; {branch}");
        assert_eq!(register(&cpu, RegisterName::Y), 1, "{setup}; {branch}");
    }
}

#[test]
fn index_compares() {
    for (operand, carry, zero, negative) in [
        (1, true, false, false),
        (3, true, true, false),
        (5, false, false, true),
    ] {
        let (cpu, _) = run(&format!("LDW #3\nCPW #{operand}"));
        assert_eq!(cpu.is_flag_set(Flag::Carry), carry, "CPW #{operand}");
        assert_eq!(cpu.is_flag_set(Flag::Zero), zero, "CPW #{operand}");
        assert_eq!(cpu.is_flag_set(Flag::Negative), negative, "CPW #{operand}");
        assert_eq!(register(&cpu, RegisterName::W), 3);

        let (cpu, _) = run(&format!("LDA #{operand}\nSTA $0300\nLDX #3\nCPX $0300"));
        assert_eq!(cpu.is_flag_set(Flag::Carry), carry, "CPX {operand}");
        assert_eq!(cpu.is_flag_set(Flag::Zero), zero, "CPX {operand}");
        assert_eq!(cpu.is_flag_set(Flag::Negative), negative, "CPX {operand}");
    }
    let (cpu, _) = run("LDA #9\nSTA $0300\nLDW #2\nCPW $0300");
    assert!(cpu.is_flag_set(Flag::Negative));
    assert!(!cpu.is_flag_set(Flag::Carry));
}

#[test]
fn index_counters_wrap() {
    let (cpu, _) = run("DEW");
    assert_eq!(register(&cpu, RegisterName::W), 0xFF);
    assert!(cpu.is_flag_set(Flag::Negative));
    assert!(!cpu.is_flag_set(Flag::Zero));

    let (cpu, _) = run("LDX #$FF\nINX");
    assert_eq!(register(&cpu, RegisterName::X), 0);
    assert!(cpu.is_flag_set(Flag::Zero));
    assert!(!cpu.is_flag_set(Flag::Negative));

    let (cpu, _) = run("LDX #$41\nINX");
    assert_eq!(register(&cpu, RegisterName::X), 0x42);
}

#[test]
fn index_registers_store() {
    let (_, mut ram) = run(
        "LDW #1
         LDY #2
         LDZ #3
         STW $0300
         STY $0301
         STZ $0302
         LDX #4
         STW $10, X
         STY $20, W
         STZ $30, W",
    );
    assert_eq!(ram.get_range(0x0300, 0x0303), Ok(&[1, 2, 3][..]));
    assert_eq!(ram.read_byte(0x14), Ok(1));
    assert_eq!(ram.read_byte(0x21), Ok(2));
    assert_eq!(ram.read_byte(0x31), Ok(3));
}

#[test]
fn shifts_and_rotates_in_memory() {
    let (cpu, mut ram) = run("LDA #$81\nSTA $0300\nBSL $0300");
    assert_eq!(ram.read_byte(0x0300), Ok(0x02));
    assert!(cpu.is_flag_set(Flag::Carry));
    assert!(!cpu.is_flag_set(Flag::Negative));
    assert_eq!(cpu.get_a(), 0x81);

    // the carry from BSL comes back in at the top
    let (cpu, mut ram) = run("LDA #$81\nSTA $0300\nBSL $0300\nROR $0300");
    assert_eq!(ram.read_byte(0x0300), Ok(0x81));
    assert!(!cpu.is_flag_set(Flag::Carry));
    assert!(cpu.is_flag_set(Flag::Negative));

    let (cpu, mut ram) = run("LDA #1\nSTA $0301\nBSR $0301");
    assert_eq!(ram.read_byte(0x0301), Ok(0));
    assert!(cpu.is_flag_set(Flag::Carry));
    assert!(!cpu.is_flag_set(Flag::Negative));
    // memory forms leave Z alone
    assert!(!cpu.is_flag_set(Flag::Zero));

    let (cpu, mut ram) = run("LDA #$80\nSTA $0301\nCLC\nBSR $0301");
    assert_eq!(ram.read_byte(0x0301), Ok(0x40));
    assert!(!cpu.is_flag_set(Flag::Carry));
}

#[test]
fn suspend_is_polled_until_it_lets_go() {
    init_logging();
    let image = assemble("NOP\nNOP").unwrap();
    let mut ram = Ram::default();
    ram.load(&image, BASE as usize).unwrap();
    let mut cpu = Cpu::new(CpuConfig::default(), String::new()).unwrap();
    let mut polls = Vec::new();
    cpu.execute(&mut ram, BASE, |pc| {
        polls.push(pc);
        pc == 0x4006 && polls.len() < 5
    })
    .unwrap();
    assert_eq!(polls, vec![0x4003, 0x4006, 0x4006, 0x4006, 0x4006]);
}

#[test]
fn programs_can_start_anywhere_in_program_memory() {
    init_logging();
    let image = assemble("LDA #42").unwrap();
    let mut ram = Ram::default();
    ram.load(&image, 0x5000).unwrap();
    let mut cpu = Cpu::new(CpuConfig::default(), String::new()).unwrap();
    cpu.execute(&mut ram, 0x5000, |_| false).unwrap();
    assert_eq!(cpu.get_a(), 42);
    assert_eq!(cpu.get_pc(), 0x5006);
}

#[test]
fn output_is_written_to_the_target() {
    let (cpu, _) = run(
        "LDA #'O'
         OUT
         LDA #'k'
         STA $0030
         OUT $0030
         LDW #1
         LDA #'!'
         STA $2F, W
         OUT $2F, W
         ONL",
    );
    assert_eq!(cpu.into_output(), "Ok!\n");
}

#[test]
fn status_survives_the_stack() {
    let (cpu, _) = run("SEC\nPHS\nCLC\nPOS\nLDA #$7F\nADD #0");
    // carry came back from the stack, and was added in
    assert_eq!(cpu.get_a(), 0x80);
    assert!(cpu.is_flag_set(Flag::Overflow));
    assert!(!cpu.is_flag_set(Flag::Carry));
}

#[test]
fn clear_overflow() {
    let (cpu, _) = run("LDA #$7F\nADD #1\nCLO");
    assert!(!cpu.is_flag_set(Flag::Overflow));
    assert!(cpu.is_flag_set(Flag::Negative));
}

#[test]
fn stack_overflow_stops_the_program() {
    init_logging();
    let source = "PHA\n".repeat(3);
    let image = assemble(&source).unwrap();
    let mut ram = Ram::default();
    ram.load(&image, BASE as usize).unwrap();
    let config = CpuConfig {
        stack: 0x0100..0x0102,
        ..CpuConfig::default()
    };
    let mut cpu = Cpu::new(config, String::new()).unwrap();
    assert!(matches!(
        cpu.run(&mut ram),
        Err(Fault::StackFault {
            kind: StackFaultKind::Overflow,
            pointer: 0x00FF
        })
    ));
    assert_eq!(cpu.state(), RunState::Faulted);
    assert_eq!(cpu.stack().depth(), 2);
}

fn line() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "NOP",
        "LDA #5",
        "STA 0,w",
        "ADD #$03",
        "BNE -6",
        "JMP $4003",
        "MOV A, Z",
        "ROL",
        "CMP #%101",
        "OUT $20, W",
        "; just a comment",
        "",
    ])
}

proptest! {
    #[test]
    fn assembly_is_deterministic(lines in prop::collection::vec(line(), 0..64)) {
        let source = lines.join("\n");
        let image = assemble(&source).unwrap();
        prop_assert_eq!(&image, &assemble(&source).unwrap());

        let instructions = lines
            .iter()
            .filter(|line| !line.is_empty() && !line.starts_with(';'))
            .count();
        prop_assert_eq!(image.len(), 3 + instructions * 3);
        let length = u16::from_be_bytes([image[1], image[2]]) as usize;
        prop_assert_eq!(length, instructions * 3);
    }
}
