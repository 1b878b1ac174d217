mod adaptation_flow;
mod closed_loop;
mod fault_recovery;
