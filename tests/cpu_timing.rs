use visual6502::{Bus, FlatMemory, Result, Status, MOS6502};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read(u16),
    Write(u16, u8),
}

/// Flat memory that logs every bus cycle.
struct TraceBus {
    mem: FlatMemory,
    log: Vec<Access>,
}

impl Bus for TraceBus {
    fn read(&mut self, address: u16) -> Result<u8> {
        self.log.push(Access::Read(address));
        self.mem.read(address)
    }
    fn write(&mut self, address: u16, value: u8) -> Result<()> {
        self.log.push(Access::Write(address, value));
        self.mem.write(address, value)
    }
}

/// Powers on with `program` at $0400, runs the reset sequence and clears the log.
fn boot(program: &[u8], setup: impl FnOnce(&mut FlatMemory)) -> MOS6502<TraceBus> {
    let mut mem = FlatMemory::new();
    mem.load(0x0400, program);
    mem.set_word(0xFFFC, 0x0400);
    setup(&mut mem);
    let mut cpu = MOS6502::new(TraceBus { mem, log: Vec::new() });
    cpu.power_on();
    cpu.execute_cycles(7).unwrap();
    cpu.bus_mut().log.clear();
    cpu
}

fn step(cpu: &mut MOS6502<TraceBus>) -> u32 {
    cpu.step_instruction().unwrap()
}

#[test]
fn reset_reads_vector_and_walks_stack() {
    let mut mem = FlatMemory::new();
    mem.set_word(0xFFFC, 0x1234);
    let mut cpu = MOS6502::new(TraceBus { mem, log: Vec::new() });
    cpu.power_on();
    cpu.execute_cycles(7).unwrap();
    assert_eq!(
        cpu.bus().log,
        [
            Access::Read(0x0000),
            Access::Read(0x0000),
            Access::Read(0x0100),
            Access::Read(0x01FF),
            Access::Read(0x01FE),
            Access::Read(0xFFFC),
            Access::Read(0xFFFD),
        ]
    );
    cpu.clock().unwrap();
    assert_eq!(cpu.pc(), 0x1235);
}

#[test]
fn absolute_indexed_read_pays_only_on_page_cross() {
    // LDX #$01; LDA $12F0,X; LDX #$20; LDA $12F0,X
    let mut cpu = boot(&[0xA2, 0x01, 0xBD, 0xF0, 0x12, 0xA2, 0x20, 0xBD, 0xF0, 0x12], |m| {
        m.load(0x12F1, &[0x11]);
        m.load(0x1310, &[0x22]);
    });
    step(&mut cpu);
    cpu.bus_mut().log.clear();
    assert_eq!(step(&mut cpu), 4);
    assert_eq!(cpu.bus().log.last(), Some(&Access::Read(0x12F1)));

    step(&mut cpu);
    assert_eq!(cpu.a(), 0x11);
    cpu.bus_mut().log.clear();
    assert_eq!(step(&mut cpu), 5);
    // the first read lands on the wrong page, then the fixup reads the right one
    assert_eq!(&cpu.bus().log[3..], [Access::Read(0x1210), Access::Read(0x1310)]);
    cpu.clock().unwrap();
    assert_eq!(cpu.a(), 0x22);
}

#[test]
fn indexed_store_always_takes_the_extra_cycle() {
    // LDA #$77; LDX #$01; STA $0200,X
    let mut cpu = boot(&[0xA9, 0x77, 0xA2, 0x01, 0x9D, 0x00, 0x02], |_| {});
    step(&mut cpu);
    step(&mut cpu);
    cpu.bus_mut().log.clear();
    assert_eq!(step(&mut cpu), 5);
    assert_eq!(cpu.bus().log[3], Access::Read(0x0201));
    assert_eq!(cpu.bus().log[4], Access::Write(0x0201, 0x77));
}

#[test]
fn indirect_y_crossing_page_adds_one_cycle() {
    // LDY #$10; LDA ($80),Y  with ($80) = $12F8
    let mut cpu = boot(&[0xA0, 0x10, 0xB1, 0x80], |m| {
        m.set_word(0x0080, 0x12F8);
        m.load(0x1308, &[0x5A]);
    });
    step(&mut cpu);
    assert_eq!(step(&mut cpu), 6);
    cpu.clock().unwrap();
    assert_eq!(cpu.a(), 0x5A);
}

#[test]
fn indirect_jmp_wraps_within_page() {
    // JMP ($34FF): high byte comes from $3400, not $3500
    let mut cpu = boot(&[0x6C, 0xFF, 0x34], |m| {
        m.load(0x34FF, &[0x80]);
        m.load(0x3400, &[0x12]);
        m.load(0x3500, &[0x56]);
    });
    assert_eq!(step(&mut cpu), 5);
    assert_eq!(&cpu.bus().log[3..], [Access::Read(0x34FF), Access::Read(0x3400)]);
    cpu.clock().unwrap();
    assert_eq!(cpu.bus().log.last(), Some(&Access::Read(0x1280)));
}

#[test]
fn zero_page_indexing_wraps() {
    // LDX #$02; LDA $FF,X reads $0001
    let mut cpu = boot(&[0xA2, 0x02, 0xB5, 0xFF], |m| m.load(0x0001, &[0x99]));
    step(&mut cpu);
    cpu.bus_mut().log.clear();
    assert_eq!(step(&mut cpu), 4);
    assert_eq!(&cpu.bus().log[2..], [Access::Read(0x00FF), Access::Read(0x0001)]);
    cpu.clock().unwrap();
    assert_eq!(cpu.a(), 0x99);
}

#[test]
fn indirect_y_pointer_wraps_in_zero_page() {
    // LDA ($FF),Y takes the pointer high byte from $0000
    let mut cpu = boot(&[0xB1, 0xFF], |m| {
        m.load(0x00FF, &[0x00]);
        m.load(0x0000, &[0x30]);
        m.load(0x3000, &[0x42]);
    });
    assert_eq!(step(&mut cpu), 5);
    assert_eq!(cpu.bus().log[2..4], [Access::Read(0x00FF), Access::Read(0x0000)]);
    cpu.clock().unwrap();
    assert_eq!(cpu.a(), 0x42);
}

#[test]
fn branch_timing_depends_on_outcome_and_page() {
    // at $04FA: CLC; BCS +2 (not taken); BCC +$10 (taken, crosses to $050F)
    let mut mem_program = vec![0xEA; 0xFA];
    mem_program.extend([0x18, 0xB0, 0x02, 0x90, 0x10]);
    let mut cpu = boot(&mem_program, |_| {});
    for _ in 0..0xFA {
        step(&mut cpu);
    }
    assert_eq!(cpu.pc(), 0x04FA);
    assert_eq!(step(&mut cpu), 2); // CLC
    assert_eq!(step(&mut cpu), 2); // BCS not taken
    assert_eq!(step(&mut cpu), 4); // BCC taken across the page
    cpu.clock().unwrap();
    assert_eq!(cpu.bus().log.last(), Some(&Access::Read(0x050F)));
}

#[test]
fn branch_within_page_takes_three_cycles() {
    // LDX #$03; loop: DEX; BNE loop
    let mut cpu = boot(&[0xA2, 0x03, 0xCA, 0xD0, 0xFD, 0xEA], |_| {});
    step(&mut cpu);
    step(&mut cpu);
    assert_eq!(step(&mut cpu), 3);
    step(&mut cpu);
    assert_eq!(step(&mut cpu), 3);
    step(&mut cpu);
    assert_eq!(step(&mut cpu), 2);
    assert_eq!(cpu.x(), 0);
}

#[test]
fn read_modify_write_writes_twice() {
    let mut cpu = boot(&[0xEE, 0x00, 0x03], |m| m.load(0x0300, &[0x41]));
    assert_eq!(step(&mut cpu), 6);
    assert_eq!(
        &cpu.bus().log[3..],
        [
            Access::Read(0x0300),
            Access::Write(0x0300, 0x41),
            Access::Write(0x0300, 0x42),
        ]
    );
}

#[test]
fn latches_keep_last_instruction_values() {
    // LDA $1234; NOP; LDA $0056
    let mut cpu = boot(&[0xAD, 0x34, 0x12, 0xEA, 0xA5, 0x56], |m| m.load(0x1234, &[0x7E]));
    step(&mut cpu);
    step(&mut cpu);
    let latches = cpu.latches();
    assert_eq!(latches.effective, 0x1234);
    assert_eq!(latches.data, 0x7E);
    step(&mut cpu);
    assert_eq!(cpu.latches().effective, 0x0056);
}

#[test]
fn end_to_end_program() {
    // LDA #$F1; LDX #$00; AND #$F1; INC $0300
    let mut cpu = boot(&[0xA9, 0xF1, 0xA2, 0x00, 0x29, 0xF1, 0xEE, 0x00, 0x03, 0xEA], |_| {});
    let cycles: Vec<u32> = (0..4).map(|_| step(&mut cpu)).collect();
    assert_eq!(cycles, [2, 2, 2, 6]);
    assert_eq!(cpu.a(), 0xF1);
    assert_eq!(cpu.x(), 0x00);
    assert_eq!(cpu.bus().mem.peek(0x0300), 0x01);
    assert!(!cpu.status().contains(Status::ZERO));
    assert!(!cpu.status().contains(Status::NEGATIVE));
}

#[test]
fn decimal_mode_add_and_subtract() {
    // SED; CLC; LDA #$09; ADC #$01; SEC; SBC #$02
    let mut cpu = boot(&[0xF8, 0x18, 0xA9, 0x09, 0x69, 0x01, 0x38, 0xE9, 0x02, 0xEA], |_| {});
    for _ in 0..4 {
        step(&mut cpu);
    }
    cpu.clock().unwrap();
    assert_eq!(cpu.a(), 0x10);
    step(&mut cpu);
    step(&mut cpu);
    cpu.clock().unwrap();
    assert_eq!(cpu.a(), 0x08);
    assert!(cpu.status().contains(Status::CARRY));
}

#[test]
fn jsr_and_rts_round_trip() {
    // JSR $0410; NOP ... $0410: LDY #$05; RTS
    let mut program = vec![0x20, 0x10, 0x04, 0xEA];
    program.resize(0x10, 0xEA);
    program.extend([0xA0, 0x05, 0x60]);
    let mut cpu = boot(&program, |_| {});
    assert_eq!(step(&mut cpu), 6);
    assert_eq!(cpu.bus().mem.peek(0x01FD), 0x04);
    assert_eq!(cpu.bus().mem.peek(0x01FC), 0x02);
    step(&mut cpu);
    assert_eq!(step(&mut cpu), 6);
    cpu.clock().unwrap();
    assert_eq!(cpu.pc(), 0x0404);
    assert_eq!(cpu.y(), 0x05);
    assert_eq!(cpu.sp(), 0xFD);
}

#[test]
fn brk_and_rti_restore_state() {
    // BRK with handler at $0600: RTI
    let mut cpu = boot(&[0x00, 0xFF, 0xEA], |m| {
        m.set_word(0xFFFE, 0x0600);
        m.load(0x0600, &[0x40]);
    });
    assert_eq!(step(&mut cpu), 7);
    // B and U set in the pushed copy only
    assert_eq!(cpu.bus().mem.peek(0x01FB), 0x34);
    assert_eq!(step(&mut cpu), 6);
    cpu.clock().unwrap();
    assert_eq!(cpu.pc(), 0x0403);
    assert!(!cpu.status().contains(Status::BREAK));
}

#[test]
fn jam_opcodes_run_as_two_cycle_placeholders() {
    let mut cpu = boot(&[0x02, 0xEA], |_| {});
    assert_eq!(step(&mut cpu), 2);
    cpu.clock().unwrap();
    assert_eq!(cpu.pc(), 0x0402);
}

#[test]
fn runs_from_rom_with_mirrored_work_ram() {
    use visual6502::{MappedBus, WorkMemory};

    // $F000: LDA #$5A; STA $0802; LDX $1002; JMP $F008
    let mut rom = vec![0xA9, 0x5A, 0x8D, 0x02, 0x08, 0xAE, 0x02, 0x10, 0x4C, 0x08, 0xF0];
    rom.resize(0x1000, 0xEA);
    rom[0xFFC] = 0x00;
    rom[0xFFD] = 0xF0;
    let mut cpu = MOS6502::new(MappedBus::new(WorkMemory::new(), rom, 0xF000));
    cpu.power_on();
    cpu.execute_cycles(7).unwrap();
    for _ in 0..3 {
        cpu.step_instruction().unwrap();
    }
    cpu.clock().unwrap();
    assert_eq!(cpu.x(), 0x5A);
    assert_eq!(cpu.bus_mut().read(0x0002).unwrap(), 0x5A);
}
