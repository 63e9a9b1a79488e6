// Interrupt Descriptor Table

use lazy_static::lazy_static;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(crate::arch::x86_64::gdt::DOUBLE_FAULT_IST_INDEX);
        }
        // Add timer interrupt handler (IRQ0 = interrupt 32)
        idt[32].set_handler_fn(timer_interrupt_handler);
        // Inter-processor interrupts, one vector per IpiKind.
        idt[0xFC].set_handler_fn(ipi_reschedule_handler);
        idt[0xFD].set_handler_fn(ipi_invalidate_tlb_handler);
        idt[0xFE].set_handler_fn(ipi_halt_handler);
        idt
    };
}

#[allow(dead_code)]
pub fn init() {
    IDT.load();
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    println!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) -> ! {
    panic!("EXCEPTION: DOUBLE FAULT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    println!("EXCEPTION: PAGE FAULT");
    println!("Accessed Address: {:?}", Cr2::read());
    println!("Error Code: {:?}", error_code);
    println!("{:#?}", stack_frame);
    panic!("Page fault");
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    println!("EXCEPTION: GENERAL PROTECTION FAULT");
    println!("Error Code: {:#x}", error_code);
    println!("{:#?}", stack_frame);
    panic!("General protection fault");
}

extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    // Acknowledge the interrupt by sending End of Interrupt (EOI) to PIC
    unsafe {
        // Send EOI to the master PIC (0x20)
        use x86_64::instructions::port::Port;
        let mut pic_command: Port<u8> = Port::new(0x20);
        pic_command.write(0x20); // EOI command
    }
}

extern "x86-interrupt" fn ipi_reschedule_handler(_stack_frame: InterruptStackFrame) {
    crate::arch::x86_64::apic::send_eoi();
    crate::sched::smp::ipi_do_handle(crate::sched::smp::IpiKind::Reschedule);
}

extern "x86-interrupt" fn ipi_invalidate_tlb_handler(_stack_frame: InterruptStackFrame) {
    crate::arch::x86_64::apic::send_eoi();
    crate::sched::smp::ipi_do_handle(crate::sched::smp::IpiKind::InvalidateTlb);
}

extern "x86-interrupt" fn ipi_halt_handler(_stack_frame: InterruptStackFrame) {
    crate::arch::x86_64::apic::send_eoi();
    // Never returns: ipi_do_handle(Halt) loops forever.
    crate::sched::smp::ipi_do_handle(crate::sched::smp::IpiKind::Halt);
}
