use super::*;
use bc_core::code::Opcode;
use bc_core::vm::Outcome;

fn sample_program() -> CompiledProgram {
    let mut code = Code::new();
    code.add_op(Opcode::PushNum);
    code.add_num(5.0);
    code.add_op(Opcode::PrintNum);
    code.add_op(Opcode::PrintNl);
    code.add_op(Opcode::End);

    let mut strings = StringPool::new();
    strings.intern("HELLO").unwrap();
    strings.mark_constants();

    let mut data = DataPool::new();
    data.add(0, DatumType::Unquoted);

    let array_descs = ArrayDescs::new();

    CompiledProgram {
        code,
        strings,
        data,
        array_descs,
        ram_size: 4,
        stack_max: 2,
        base_index: 0,
        string_var_ram_positions: vec![2],
    }
}

#[test]
fn write_read_roundtrips_every_section() {
    let path = "basfile_roundtrip_test.basc";
    let program = sample_program();

    write_file(path, &program).unwrap();
    let read_back = read_file(path).unwrap();
    std::fs::remove_file(path).unwrap();

    assert_eq!(read_back.ram_size, program.ram_size);
    assert_eq!(read_back.stack_max, program.stack_max);
    assert_eq!(read_back.base_index, program.base_index);
    assert_eq!(read_back.string_var_ram_positions, program.string_var_ram_positions);
    assert_eq!(read_back.strings.texts(), program.strings.texts());
    assert_eq!(read_back.strings.n_const(), program.strings.n_const());
    assert_eq!(read_back.data.items(), program.data.items());
    assert_eq!(read_back.array_descs.get(0), program.array_descs.get(0));
}

#[test]
fn loaded_image_runs_the_same_as_the_original() {
    let path = "basfile_run_test.basc";
    let mut program = sample_program();
    write_file(path, &program).unwrap();
    let mut loaded = read_file(path).unwrap();
    std::fs::remove_file(path).unwrap();

    let mut out_a = Vec::new();
    let mut in_a = std::io::empty();
    let outcome_a = program.run(&mut out_a, &mut in_a, None, 256, false).unwrap();

    let mut out_b = Vec::new();
    let mut in_b = std::io::empty();
    let outcome_b = loaded.run(&mut out_b, &mut in_b, None, 256, false).unwrap();

    assert_eq!(outcome_a, Outcome::Ended);
    assert_eq!(outcome_b, Outcome::Ended);
    assert_eq!(out_a, out_b);
}

#[test]
fn rejects_bad_magic() {
    let bytes = vec![0u8; 16];
    let err = read(&mut std::io::Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, Error::BadMagic));
}
